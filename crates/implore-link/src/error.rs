//! Error types for implore-link
//!
//! Only malformed host commands surface as errors:
//! - Unknown view ids on per-view commands
//! - Invalid data domains or oversized datasets on registration
//! - Undecodable dataset buffers
//! - Invalid configuration
//!
//! Failures while talking to a rendering handle are `HandleError`s. They are
//! logged and swallowed by the coordination layer, never propagated to the host.

use implore_link_io::DecodeError;
use thiserror::Error;

use crate::view::ViewId;

/// Main error type for implore-link operations
#[derive(Error, Debug)]
pub enum LinkError {
    /// Per-view command for a view that was never registered
    #[error("Unknown view: {0}")]
    UnknownView(ViewId),

    /// Axis domain that cannot be mapped (min == max or non-finite)
    #[error("Invalid {axis} domain: [{min}, {max}]")]
    InvalidDomain {
        axis: &'static str,
        min: f64,
        max: f64,
    },

    /// Dataset larger than the configured limit
    #[error("Dataset exceeds size limit: {size} points (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// Dataset buffers could not be decoded
    #[error("Failed to decode dataset: {0}")]
    Decode(#[from] DecodeError),

    /// Rendering handle failure surfaced from a direct call
    #[error("Rendering handle error: {0}")]
    Handle(#[from] HandleError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by a rendering handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// The handle was destroyed (context lost, torn down, or retired)
    #[error("Rendering handle has been destroyed")]
    Destroyed,

    /// The rendering backend rejected the call
    #[error("Rendering backend error: {0}")]
    Backend(String),
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Required field is missing or empty
    #[error("Missing field: {0}")]
    MissingField(String),

    /// TOML could not be parsed
    #[error("TOML error: {0}")]
    Toml(String),

    /// JSON could not be parsed
    #[error("JSON error: {0}")]
    Json(String),
}

/// Result type alias for implore-link operations
pub type LinkResult<T> = Result<T, LinkError>;

/// Result type alias for rendering handle calls
pub type HandleResult<T> = Result<T, HandleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_view_display() {
        let err = LinkError::UnknownView(ViewId::from("p7"));
        assert!(err.to_string().contains("p7"));
    }

    #[test]
    fn test_invalid_domain_display() {
        let err = LinkError::InvalidDomain {
            axis: "x",
            min: 1.0,
            max: 1.0,
        };
        assert_eq!(err.to_string(), "Invalid x domain: [1, 1]");
    }

    #[test]
    fn test_handle_error_converts() {
        let err: LinkError = HandleError::Destroyed.into();
        assert!(matches!(err, LinkError::Handle(HandleError::Destroyed)));
    }

    #[test]
    fn test_decode_error_converts() {
        let err: LinkError = DecodeError::MissingPrefix.into();
        assert!(err.to_string().starts_with("Failed to decode dataset"));
    }
}
