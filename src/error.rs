//! Error types for QAStream
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.
//!
//! Decode and parse errors are recovered where they occur (substitution
//! or dropped frame) and only ever appear in logs. Connection, upload and
//! generation errors propagate to the caller after the busy flag has been
//! cleared.

use thiserror::Error;

use crate::session::GenerationToken;

/// Main error type for QAStream operations
#[derive(Error, Debug)]
pub enum QaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend could not be reached, answered with a non-success
    /// status, or returned no body
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed byte sequence in the response body
    #[error("Decode error: {0}")]
    Decode(String),

    /// Malformed frame payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// File upload rejected by the backend (message is the server text)
    #[error("{0}")]
    Upload(String),

    /// Failure while a turn was streaming
    #[error("Generation error: {0}")]
    Generation(String),

    /// A submission arrived while another generation is in flight
    #[error("A generation is already in progress")]
    Busy,

    /// An update targeted a turn that is no longer open
    #[error("Stale generation: update for {got} while open turn is {}", open_label(.expected))]
    StaleGeneration {
        /// The currently open generation, if any
        expected: Option<GenerationToken>,
        /// The token carried by the rejected update
        got: GenerationToken,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn open_label(open: &Option<GenerationToken>) -> String {
    open.map_or_else(|| "none".to_string(), |t| t.to_string())
}

/// Result type alias for QAStream operations
///
/// Uses `anyhow::Error` so callers can attach context; the underlying
/// [`QaError`] can be recovered with `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = QaError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_connection_error_display() {
        let error = QaError::Connection("HTTP 502 Bad Gateway".to_string());
        assert_eq!(error.to_string(), "Connection error: HTTP 502 Bad Gateway");
    }

    #[test]
    fn test_upload_error_is_verbatim() {
        let error = QaError::Upload("Only PDF files are accepted".to_string());
        assert_eq!(error.to_string(), "Only PDF files are accepted");
    }

    #[test]
    fn test_generation_error_display() {
        let error = QaError::Generation("stream closed".to_string());
        assert_eq!(error.to_string(), "Generation error: stream closed");
    }

    #[test]
    fn test_busy_error_display() {
        assert_eq!(
            QaError::Busy.to_string(),
            "A generation is already in progress"
        );
    }

    #[test]
    fn test_stale_generation_display() {
        let error = QaError::StaleGeneration {
            expected: Some(GenerationToken::new(3)),
            got: GenerationToken::new(2),
        };
        let s = error.to_string();
        assert!(s.contains("gen-3"));
        assert!(s.contains("gen-2"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: QaError = io_error.into();
        assert!(matches!(error, QaError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: QaError = json_error.into();
        assert!(matches!(error, QaError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: QaError = yaml_error.into();
        assert!(matches!(error, QaError::Yaml(_)));
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = QaError::Busy.into();
        assert!(matches!(err.downcast_ref::<QaError>(), Some(QaError::Busy)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QaError>();
    }
}
