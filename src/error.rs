//! Error types for cache operations
//!
//! Every failure inside the caching layer is absorbed by [`crate::cache::FieldCache`]
//! and degrades to "treat as uncached". These types exist so that backends and
//! construction code can report what went wrong before it is logged.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid construction-time configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error - the remote store could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis/Valkey protocol or transport error
    #[error("Backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// Remote operation timed out
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    Timeout { timeout_ms: u64, context: String },

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::Connection("refused".to_string());
        assert_eq!(error.to_string(), "Connection error: refused");

        let timeout_error = CacheError::Timeout {
            timeout_ms: 2000,
            context: "GET 42".to_string(),
        };
        assert!(timeout_error.to_string().contains("timed out after 2000ms"));

        let config_error = CacheError::Config("capacity must be greater than 0".to_string());
        assert!(config_error.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_error_conversion() {
        let error: CacheError = "test error".into();
        assert!(matches!(error, CacheError::Other(_)));

        let error: CacheError = "test error".to_string().into();
        assert!(matches!(error, CacheError::Other(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: CacheError = json_err.into();
        assert!(matches!(error, CacheError::Serialization(_)));
    }
}
