//! Core library for the chord ring.
//!
//! This crate provides the fundamental abstractions of the ring:
//! - Ring identifiers (tokens) and partitioners
//! - Node addresses
//! - Per-node primary/replica tables and the per-key chain locks
//! - Ring nodes and the topology directory

pub mod error;
pub mod lock;
pub mod network;
pub mod node;
pub mod partitioner;
pub mod store;
pub mod token;
pub mod topology;

pub use error::{Error, Result};
pub use lock::{ChainLock, KeyedLocks};
pub use network::Address;
pub use node::{Consistency, Neighbors, NodeSettings, Peer, RingNode};
pub use partitioner::{Partitioner, PartitionerKind};
pub use store::{Record, Store};
pub use token::Token;
pub use topology::Directory;
