//! Error types for the replay host

use implore_link::{ConfigError, HandleError, LinkError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("Gesture failed: {0}")]
    Handle(#[from] HandleError),

    /// Gesture on a view the script never registered
    #[error("Step {step}: unknown view '{view}'")]
    UnknownView { step: usize, view: String },

    #[error("Failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

pub type ReplayResult<T> = Result<T, ReplayError>;
