//! Configuration for implore-link
//!
//! Centralized configuration for sync timing and filter reporting.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Longest leader window accepted by `validate`
const MAX_LEADER_WINDOW_MS: u64 = 10_000;

/// Session-wide configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Camera and selection sync settings
    #[serde(default)]
    pub sync: SyncConfig,
    /// Filter engine settings
    #[serde(default)]
    pub filter: FilterConfig,
}

/// Sync timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How long a view keeps camera leadership after its last change
    pub leader_window_ms: u64,
    /// How long a freshly rendered view ignores its own camera changes
    pub warmup_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            leader_window_ms: 50,
            warmup_ms: 800,
        }
    }
}

impl SyncConfig {
    pub fn leader_window(&self) -> Duration {
        Duration::from_millis(self.leader_window_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}

/// Filter engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// View whose visible count is reported to the host
    pub primary_view: String,
    /// Largest dataset accepted on registration
    pub max_points: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            primary_view: "p1".to_string(),
            max_points: 2_000_000,
        }
    }
}

impl LinkConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Json(e.to_string()))
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Json(e.to_string()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.primary_view.trim().is_empty() {
            return Err(ConfigError::MissingField("filter.primary_view".to_string()));
        }

        if self.filter.max_points == 0 {
            return Err(ConfigError::OutOfRange(
                "filter.max_points must be positive".to_string(),
            ));
        }

        if self.sync.leader_window_ms > MAX_LEADER_WINDOW_MS {
            return Err(ConfigError::OutOfRange(format!(
                "sync.leader_window_ms must be at most {}",
                MAX_LEADER_WINDOW_MS
            )));
        }

        Ok(())
    }
}
