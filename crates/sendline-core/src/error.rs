//! Error types for sendline.

use thiserror::Error;

/// Result type alias using sendline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for sendline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis operation failed (stream, pub/sub, or replay buffer)
    #[error("Redis error: {0}")]
    Redis(String),

    /// Cross-instance relay is required but unavailable (fail-closed mode)
    #[error("Relay error: {0}")]
    Relay(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Redis(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("proposal abc".to_string());
        assert_eq!(err.to_string(), "Not found: proposal abc");
    }

    #[test]
    fn test_error_display_relay() {
        let err = Error::Relay("connection refused".to_string());
        assert_eq!(err.to_string(), "Relay error: connection refused");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("EVENT_STREAM_KEY is empty".to_string());
        assert!(err.to_string().starts_with("Configuration error:"));
    }
}
