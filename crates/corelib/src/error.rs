//! Error types for the core library.

use crate::network::Address;
use crate::token::Token;
use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid token value
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    /// Two nodes hashed to the same ring position
    #[error("Duplicate ring position {0}")]
    DuplicateToken(Token),
    /// Node is not registered in the directory
    #[error("Unknown node at {0}")]
    UnknownNode(Address),
    /// Ring relinking failed
    #[error("Topology error: {0}")]
    Topology(String),
}
