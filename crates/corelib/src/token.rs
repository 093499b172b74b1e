//! Ring identifiers.
//!
//! A [`Token`] is the position of a node or a key on the identifier ring
//! `[0, u128::MAX]`. Tokens are produced by a
//! [`Partitioner`](crate::partitioner::Partitioner) and compared as unsigned
//! integers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position on the identifier ring.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Token(pub u128);

impl Token {
    /// Minimum token value (start of ring).
    pub const MIN: Token = Token(0);
    /// Maximum token value (end of ring).
    pub const MAX: Token = Token(u128::MAX);

    /// Parses the 32-digit hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Result<Self> {
        u128::from_str_radix(s.trim(), 16)
            .map(Token)
            .map_err(|e| Error::InvalidToken(format!("{s}: {e}")))
    }

    /// Returns true if `self` lies on the arc `(start, end]` walking clockwise.
    ///
    /// When `start > end` the arc wraps past `MAX`. When `start == end` the arc
    /// covers the whole ring, which is the single-node case.
    pub fn within(&self, start: Token, end: Token) -> bool {
        if start == end {
            return true;
        }
        if start < end {
            *self > start && *self <= end
        } else {
            *self > start || *self <= end
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}
