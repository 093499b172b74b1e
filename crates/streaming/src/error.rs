//! Error types for the streaming crate.

use crate::codec::MAX_FRAME_LEN;
use crate::protocol::MessageType;
use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T> = std::result::Result<T, StreamingError>;

#[derive(Debug, Error)]
pub enum StreamingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("Frame of {0} bytes exceeds the {} byte limit", MAX_FRAME_LEN)]
    FrameTooLarge(usize),
    #[error("{0} message carries no payload")]
    MissingPayload(MessageType),
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] corelib::Error),
}
