//! Cryptographic digest partitioner.

use crate::partitioner::traits::Partitioner;
use crate::token::Token;

/// Partitioner backed by BLAKE3, truncated to the first 16 digest bytes.
#[derive(Clone, Debug, Default)]
pub struct Blake3Partitioner;

impl Partitioner for Blake3Partitioner {
    fn partition(&self, key: &[u8]) -> Token {
        let digest = blake3::hash(key);
        let mut head = [0u8; 16];
        head.copy_from_slice(&digest.as_bytes()[..16]);
        Token(u128::from_be_bytes(head))
    }

    fn name(&self) -> &'static str {
        "Blake3Partitioner"
    }
}
