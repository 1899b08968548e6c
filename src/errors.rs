//! Error types for aishell
//!
//! Store-level failures are recoverable and are logged by the orchestrator;
//! generation failures are fatal for the current invocation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the assistant
#[derive(Error, Debug)]
pub enum AssistError {
    /// Retry state machine transition errors
    #[error("Invalid state transition from {from} on {event}: {reason}")]
    InvalidTransition {
        from: String,
        event: String,
        reason: String,
    },

    /// Persisting a store to disk failed; the in-memory view is kept
    #[error("Failed to write store {}: {source}", path.display())]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The generation backend did not produce a usable command
    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    /// Ollama API errors
    #[error("Ollama API error: {0}")]
    OllamaApiError(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A store or config file could not be read
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistError>;

impl AssistError {
    /// Wrap an I/O error raised while persisting `path`
    pub fn store_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AssistError::StoreWrite {
            path: path.into(),
            source,
        }
    }

    /// Whether the error only affects durability of a store
    pub fn is_store_error(&self) -> bool {
        matches!(self, AssistError::StoreWrite { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AssistError::GenerationFailure("HTTP 500".to_string());
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = AssistError::InvalidTransition {
            from: "Lookup".to_string(),
            event: "AlternativeReady".to_string(),
            reason: "No alternative was requested".to_string(),
        };
        assert!(err.to_string().contains("Lookup"));
        assert!(err.to_string().contains("AlternativeReady"));
    }

    #[test]
    fn test_store_write_error() {
        let err = AssistError::store_write(
            "/tmp/cache.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_store_error());
        assert!(err.to_string().contains("cache.jsonl"));
        assert!(!AssistError::ConfigError("x".to_string()).is_store_error());
    }
}
