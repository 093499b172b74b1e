//! XXH3 partitioner implementation.

use crate::partitioner::traits::Partitioner;
use crate::token::Token;
use xxhash_rust::xxh3::xxh3_128;

/// Default partitioner: 128-bit XXH3, fast and well distributed.
#[derive(Clone, Debug, Default)]
pub struct Xxh3Partitioner;

impl Partitioner for Xxh3Partitioner {
    fn partition(&self, key: &[u8]) -> Token {
        Token(xxh3_128(key))
    }

    fn name(&self) -> &'static str {
        "Xxh3Partitioner"
    }
}
