//! Error types for pushtally-storage
//!
//! Database failures are transient from the engine's point of view: every
//! mutation is a single transaction, so a failed step leaves no partial
//! state behind and can be retried as a whole.

use pushtally_core::LogError;
use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database could not be opened or created
    #[error("Database error: {0}")]
    Database(String),

    /// A transaction could not be started or committed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A table could not be opened
    #[error("Table error: {0}")]
    Table(String),

    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during deserialization
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Error from the event log
    #[error("Event log error: {0}")]
    Log(#[from] LogError),
}

impl StorageError {
    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new Deserialization error
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// Whether retrying the enclosing operation may succeed
    ///
    /// Codec errors mean stored data is unreadable and will not go away on
    /// retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) | Self::Transaction(_) | Self::Table(_) | Self::Io(_) => true,
            Self::Log(LogError::Io(_)) => true,
            Self::Serialization(_) | Self::Deserialization(_) | Self::Log(_) => false,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Table(err.to_string())
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Convert from postcard Error to StorageError
impl From<postcard::Error> for StorageError {
    fn from(err: postcard::Error) -> Self {
        StorageError::Deserialization(err.to_string())
    }
}
