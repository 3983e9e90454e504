//! Error types for the event log collaborator

use thiserror::Error;

use crate::types::StreamPos;

/// Errors raised by an [`EventLog`](crate::EventLog) implementation
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Event log I/O error: {0}")]
    Io(String),

    #[error("Event log codec error: {0}")]
    Codec(String),

    #[error("Position {attempted} does not follow the log head {head}")]
    PositionConflict {
        attempted: StreamPos,
        head: StreamPos,
    },

    #[error("Event log is closed")]
    Closed,
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        LogError::Io(err.to_string())
    }
}
