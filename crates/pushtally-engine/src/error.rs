//! Error types for the notification engine

use thiserror::Error;

use pushtally_core::LogError;
use pushtally_storage::StorageError;

/// Errors that can occur in the notification engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Event log error
    #[error("Event log error: {0}")]
    Log(#[from] LogError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background task failed to complete
    #[error("Task error: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl EngineError {
    /// Whether retrying the operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Storage(e) => e.is_retryable(),
            EngineError::Log(LogError::Io(_)) => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(e: tokio::task::JoinError) -> Self {
        EngineError::Task(e.to_string())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_errors_convert() {
        let err: EngineError = LogError::Closed.into();
        assert!(matches!(err, EngineError::Log(LogError::Closed)));
        assert!(!err.is_retryable());

        let err: EngineError = LogError::Io("disk full".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_config_error_message() {
        let err = EngineError::Config("bad interval".into());
        assert_eq!(err.to_string(), "Configuration error: bad interval");
    }
}
