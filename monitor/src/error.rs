//! Error types for the FocusFlow Monitor.
//!
//! Most failures inside the engine are recovered locally (backend failures
//! fall back to rule-based scoring, sink failures are logged). The types here
//! cover what does reach callers: configuration, I/O at the boundaries, and a
//! vanished engine task.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::sink::SinkError;
use crate::source::SourceError;

/// Errors that can occur during monitor operations.
///
/// This is the primary error type for the crate, encompassing all failure
/// modes that callers may need to handle.
#[derive(Error, Debug)]
pub enum FocusError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Classification backend error.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Persistence sink error.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Observation source error.
    #[error("observation source error: {0}")]
    Source(#[from] SourceError),

    /// The engine task has stopped and can no longer accept commands.
    #[error("engine is not running")]
    EngineStopped,
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, FocusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::MissingEnvVar("FOCUSFLOW_API_KEY".to_string());
        assert_eq!(
            err.to_string(),
            "missing required environment variable: FOCUSFLOW_API_KEY"
        );

        let err = ConfigError::InvalidValue {
            key: "FOCUSFLOW_SWITCH_STRIDE".to_string(),
            message: "value must be greater than 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for FOCUSFLOW_SWITCH_STRIDE: value must be greater than 0"
        );
    }

    #[test]
    fn focus_error_config_display() {
        let err: FocusError = ConfigError::NoHomeDirectory.into();
        assert!(matches!(err, FocusError::Config(_)));
        assert_eq!(
            err.to_string(),
            "configuration error: failed to determine home directory"
        );
    }

    #[test]
    fn focus_error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FocusError = io_err.into();
        assert!(matches!(err, FocusError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn focus_error_json_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ invalid json }").unwrap_err();
        let err: FocusError = json_err.into();
        assert!(matches!(err, FocusError::Json(_)));
    }

    #[test]
    fn focus_error_backend_display() {
        let err: FocusError = BackendError::Malformed("no JSON array".to_string()).into();
        assert_eq!(
            err.to_string(),
            "backend error: malformed backend response: no JSON array"
        );
    }

    #[test]
    fn engine_stopped_display() {
        assert_eq!(FocusError::EngineStopped.to_string(), "engine is not running");
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: FocusError = io_err.into();
        assert!(err.source().is_some());
    }

    #[test]
    fn result_type_alias_works() {
        fn stopped() -> Result<()> {
            Err(FocusError::EngineStopped)
        }
        assert!(stopped().is_err());
    }
}
