//! Partitioner abstraction for consistent hashing.
//!
//! Partitioners are responsible for converting keys into tokens
//! that can be placed on the hash ring.

pub mod byte_ordered;
pub mod digest;
pub mod traits;
pub mod xxh3;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use byte_ordered::ByteOrderedPartitioner;
pub use digest::Blake3Partitioner;
pub use traits::Partitioner;
pub use xxh3::Xxh3Partitioner;

/// Selects one of the built-in partitioners by name.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionerKind {
    #[default]
    Xxh3,
    Blake3,
    ByteOrdered,
}

impl PartitionerKind {
    pub fn build(self) -> Arc<dyn Partitioner> {
        match self {
            PartitionerKind::Xxh3 => Arc::new(Xxh3Partitioner),
            PartitionerKind::Blake3 => Arc::new(Blake3Partitioner),
            PartitionerKind::ByteOrdered => Arc::new(ByteOrderedPartitioner),
        }
    }
}

impl fmt::Display for PartitionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartitionerKind::Xxh3 => "xxh3",
            PartitionerKind::Blake3 => "blake3",
            PartitionerKind::ByteOrdered => "byte-ordered",
        };
        f.write_str(name)
    }
}

impl FromStr for PartitionerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xxh3" => Ok(PartitionerKind::Xxh3),
            "blake3" => Ok(PartitionerKind::Blake3),
            "byte-ordered" | "byte_ordered" => Ok(PartitionerKind::ByteOrdered),
            other => Err(format!("unknown partitioner: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    #[test]
    fn test_partitioners_are_deterministic() {
        for kind in [PartitionerKind::Xxh3, PartitionerKind::Blake3, PartitionerKind::ByteOrdered] {
            let p = kind.build();
            assert_eq!(p.partition(b"alice"), p.partition(b"alice"));
            assert_ne!(p.partition(b"alice"), p.partition(b"bob"), "{}", p.name());
        }
    }

    #[test]
    fn test_byte_ordered_preserves_order() {
        let p = ByteOrderedPartitioner;
        let a = p.partition_str("1");
        let b = p.partition_str("1a");
        let c = p.partition_str("2");
        assert!(a < b && b < c);
        assert_eq!(p.partition(&[]), Token::MIN);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("xxh3".parse::<PartitionerKind>().unwrap(), PartitionerKind::Xxh3);
        assert_eq!(
            "Byte-Ordered".parse::<PartitionerKind>().unwrap(),
            PartitionerKind::ByteOrdered
        );
        assert!("sha1".parse::<PartitionerKind>().is_err());
        assert_eq!(PartitionerKind::Blake3.to_string(), "blake3");
    }
}
