//! Error types for the replication crate.

use std::time::Duration;
use streaming::StreamingError;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Core(#[from] corelib::Error),
    #[error(transparent)]
    Streaming(#[from] StreamingError),
    /// Join request rejected by the responsible node
    #[error("Join rejected: {0}")]
    Join(String),
    /// Depart request rejected
    #[error("Depart rejected: {0}")]
    Depart(String),
    #[error("No reply within {0:?}")]
    Timeout(Duration),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for ReplicationError {
    fn from(err: std::io::Error) -> Self {
        ReplicationError::Streaming(StreamingError::Io(err))
    }
}
