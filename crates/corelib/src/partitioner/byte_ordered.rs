//! Byte-ordered partitioner implementation.

use crate::partitioner::traits::Partitioner;
use crate::token::Token;

/// Order-preserving partitioner.
///
/// The first 16 key bytes are read big-endian and zero padded, so token
/// order follows the lexicographic order of the keys (up to 16 bytes).
#[derive(Clone, Debug, Default)]
pub struct ByteOrderedPartitioner;

impl Partitioner for ByteOrderedPartitioner {
    fn partition(&self, key: &[u8]) -> Token {
        let mut head = [0u8; 16];
        let len = key.len().min(16);
        head[..len].copy_from_slice(&key[..len]);
        Token(u128::from_be_bytes(head))
    }

    fn name(&self) -> &'static str {
        "ByteOrderedPartitioner"
    }
}
