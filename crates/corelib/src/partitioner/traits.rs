//! Core partitioner trait definitions.

use crate::token::Token;

/// A partitioner converts keys into tokens for placement on the hash ring.
///
/// Partitioners are stateless and thread-safe, allowing concurrent
/// token generation without synchronization overhead. The same partitioner
/// must be used by every node of a ring.
pub trait Partitioner: Send + Sync + std::fmt::Debug + 'static {
    /// Converts a key into a token.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to partition
    ///
    /// # Returns
    ///
    /// A token representing the position on the ring
    fn partition(&self, key: &[u8]) -> Token;

    /// Returns the name of this partitioner.
    fn name(&self) -> &'static str;

    /// Convenience wrapper for string keys.
    fn partition_str(&self, key: &str) -> Token {
        self.partition(key.as_bytes())
    }
}
