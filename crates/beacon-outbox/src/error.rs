//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Invalid or missing client settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector answered with a non-success status
    #[error("Collector rejected event: HTTP {status}: {body}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// Send error
    #[error("Send failed: {0}")]
    Send(String),

    /// No Tokio runtime to run submissions on
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = OutboxError::Transport {
            status: 401,
            body: "bad write key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Collector rejected event: HTTP 401: bad write key"
        );
    }

    #[test]
    fn json_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{{{").unwrap_err();
        let err: OutboxError = serde_err.into();
        assert!(err.to_string().starts_with("JSON error:"));
    }
}
