//! Replay scripts
//!
//! A script is a JSON document with an optional session configuration and a
//! list of steps. Each step is either a host command (register, filter,
//! sync group, selection) or a simulated user gesture on a headless view.

use implore_link::{
    CameraView, DatasetDescriptor, EncodedBuffer, FilterCommand, LinkConfig, ToggleMode,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ReplayError, ReplayResult};

/// A complete replay script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Session configuration; the CLI `--config` file takes precedence
    #[serde(default)]
    pub config: Option<LinkConfig>,

    pub steps: Vec<Step>,
}

/// One event-loop turn of the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Render a view from a dataset descriptor
    Register {
        view: String,
        descriptor: DatasetDescriptor,
        /// Back the view with a renderer that ignores silent applies
        #[serde(default)]
        leaky: bool,
    },

    /// Replace some of a view's variable buffers, e.g. a new color variable
    UpdateVariables {
        view: String,
        variables: BTreeMap<String, EncodedBuffer>,
    },

    /// Update a filter source
    Filter { command: FilterCommand },

    /// Click a legend entry
    ToggleCategory {
        variable: String,
        code: i64,
        #[serde(default = "default_toggle_mode")]
        mode: ToggleMode,
        #[serde(default)]
        source_view: Option<String>,
    },

    /// Create or dissolve a sync group
    SyncGroup {
        enabled: bool,
        #[serde(default)]
        views: Vec<String>,
    },

    /// User pans or zooms a view
    UserCamera { view: String, camera: CameraView },

    /// User pans a view by a normalized offset
    Pan { view: String, dx: f64, dy: f64 },

    /// User zooms a view by a factor
    Zoom { view: String, factor: f64 },

    /// User selects points in a view
    UserSelect { view: String, indices: Vec<u32> },

    /// User clears the selection of a view
    UserDeselect { view: String },

    /// Host replaces a view's selection
    SetSelection { view: String, indices: Vec<u32> },

    /// Host clears a view's selection
    ClearSelection { view: String },

    /// Host clears every selection
    ClearAllSelections,

    /// Remove a view's element from the page
    Detach { view: String },

    /// Run the garbage collector
    Sweep,

    /// Let time pass
    Advance { ms: u64 },
}

fn default_toggle_mode() -> ToggleMode {
    ToggleMode::Only
}

impl Script {
    pub fn from_json(json: &str) -> ReplayResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> ReplayResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// Load a session configuration from a `.toml` or `.json` file
pub fn load_config(path: &Path) -> ReplayResult<LinkConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => LinkConfig::from_toml(&text)?,
        _ => LinkConfig::from_json(&text)?,
    };
    config.validate()?;
    Ok(config)
}
