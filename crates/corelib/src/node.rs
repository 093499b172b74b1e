//! Ring nodes.
//!
//! A [`RingNode`] owns its primary and replica tables and its per-key chain locks. Its
//! neighbours are held as [`Peer`] values: the ring is a relation between
//! nodes, and no node owns another. The [`Directory`](crate::topology::Directory)
//! is the arena that resolves a `Peer` back to a node.

use crate::lock::KeyedLocks;
use crate::network::Address;
use crate::partitioner::Partitioner;
use crate::store::{Record, Store};
use crate::token::Token;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Replication discipline of a node, fixed for its lifetime.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    /// Fire-and-forget fan-out to successors; reads may be stale.
    #[default]
    Eventual,
    /// Chained lock/propagate/unlock; reads are answered by the chain tail.
    Linearizable,
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consistency::Eventual => f.write_str("eventual"),
            Consistency::Linearizable => f.write_str("linearizable"),
        }
    }
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eventual" => Ok(Consistency::Eventual),
            "linear" | "linearizable" => Ok(Consistency::Linearizable),
            other => Err(format!("unknown consistency level: {other}")),
        }
    }
}

/// Reference to another ring member.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub serial: u64,
    pub token: Token,
    pub address: Address,
}

/// The two ring neighbours of a node, always read and written together.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Neighbors {
    pub predecessor: Peer,
    pub successor: Peer,
}

/// Static settings shared by every node of a ring.
#[derive(Clone, Debug)]
pub struct NodeSettings {
    /// Copies per key, including the primary.
    pub replication_factor: usize,
    pub consistency: Consistency,
    pub partitioner: Arc<dyn Partitioner>,
}

/// Logical participant of the ring.
pub struct RingNode {
    serial: u64,
    token: Token,
    address: Address,
    settings: NodeSettings,
    neighbors: RwLock<Neighbors>,
    store: Store,
    replicas: Store,
    locks: KeyedLocks,
    departed: AtomicBool,
}

impl RingNode {
    /// Creates a node whose ring position is `partition(serial)`.
    ///
    /// Until it is linked, the node is a ring of one: both neighbours point
    /// at itself.
    pub fn new(serial: u64, address: Address, settings: NodeSettings) -> Self {
        let token = settings.partitioner.partition_str(&serial.to_string());
        let me = Peer {
            serial,
            token,
            address,
        };
        Self {
            serial,
            token,
            address,
            settings,
            neighbors: RwLock::new(Neighbors {
                predecessor: me,
                successor: me,
            }),
            store: Store::new(),
            replicas: Store::new(),
            locks: KeyedLocks::new(),
            departed: AtomicBool::new(false),
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn as_peer(&self) -> Peer {
        Peer {
            serial: self.serial,
            token: self.token,
            address: self.address,
        }
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn replication_factor(&self) -> usize {
        self.settings.replication_factor
    }

    pub fn consistency(&self) -> Consistency {
        self.settings.consistency
    }

    pub fn is_linear(&self) -> bool {
        self.settings.consistency == Consistency::Linearizable
    }

    /// Token of a raw key under this ring's partitioner.
    pub fn hash_key(&self, key: &str) -> Token {
        self.settings.partitioner.partition_str(key)
    }

    // ------------------------------------------------------------------
    // Ring pointers
    // ------------------------------------------------------------------

    pub fn neighbors(&self) -> Neighbors {
        *self.neighbors.read()
    }

    pub fn predecessor(&self) -> Peer {
        self.neighbors.read().predecessor
    }

    pub fn successor(&self) -> Peer {
        self.neighbors.read().successor
    }

    pub(crate) fn set_neighbors(&self, neighbors: Neighbors) {
        *self.neighbors.write() = neighbors;
    }

    pub(crate) fn set_predecessor(&self, predecessor: Peer) {
        self.neighbors.write().predecessor = predecessor;
    }

    pub(crate) fn set_successor(&self, successor: Peer) {
        self.neighbors.write().successor = successor;
    }

    /// True iff `predecessor < token <= self`, wrapping past the end of the
    /// ring for the smallest node. A departed node is responsible for nothing.
    pub fn is_responsible(&self, token: Token) -> bool {
        !self.has_departed() && token.within(self.predecessor().token, self.token)
    }

    /// Marks the node as leaving. From here on every keyed request it still
    /// receives is forwarded to its successor.
    pub fn mark_departed(&self) {
        self.departed.store(true, Ordering::Release);
    }

    pub fn has_departed(&self) -> bool {
        self.departed.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Primary table
    // ------------------------------------------------------------------

    /// Upsert into the primary table. Always succeeds.
    pub fn insert(&self, token: Token, record: Record) -> bool {
        self.store.insert(token, record);
        true
    }

    /// Returns whether an entry existed.
    pub fn delete(&self, token: &Token) -> bool {
        self.store.remove(token)
    }

    /// The stored value, or `None` when absent or empty.
    pub fn query(&self, token: &Token) -> Option<String> {
        self.store
            .get(token)
            .map(|record| record.value)
            .filter(|value| !value.is_empty())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ------------------------------------------------------------------
    // Replica table
    // ------------------------------------------------------------------

    pub fn insert_replica(&self, token: Token, record: Record) -> bool {
        self.replicas.insert(token, record);
        true
    }

    pub fn delete_replica(&self, token: &Token) -> bool {
        self.replicas.remove(token)
    }

    pub fn query_replica(&self, token: &Token) -> Option<String> {
        self.replicas
            .get(token)
            .map(|record| record.value)
            .filter(|value| !value.is_empty())
    }

    pub fn replicas(&self) -> &Store {
        &self.replicas
    }

    /// Human readable dump of both tables, used by the `*` query.
    pub fn special_query(&self) -> String {
        format!(
            "node {} [{}]: {} | replicas: {}",
            self.serial, self.address, self.store, self.replicas
        )
    }

    // ------------------------------------------------------------------
    // Chain locks
    // ------------------------------------------------------------------

    pub fn try_lock(&self, token: Token) -> bool {
        self.locks.try_lock(token)
    }

    pub async fn acquire_lock(&self, token: Token) {
        self.locks.acquire(token).await
    }

    pub fn release_lock(&self, token: Token) -> bool {
        self.locks.release(token)
    }

    pub fn is_locked(&self, token: Token) -> bool {
        self.locks.is_locked(token)
    }

    /// Number of keys this node currently holds a chain lock for.
    pub fn held_locks(&self) -> usize {
        self.locks.held()
    }
}

impl fmt::Debug for RingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let neighbors = self.neighbors();
        f.debug_struct("RingNode")
            .field("serial", &self.serial)
            .field("token", &self.token)
            .field("address", &self.address)
            .field("predecessor", &neighbors.predecessor.serial)
            .field("successor", &neighbors.successor.serial)
            .field("keys", &self.store.len())
            .field("replicas", &self.replicas.len())
            .field("departed", &self.has_departed())
            .finish()
    }
}

impl fmt::Display for RingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}@{}", self.serial, self.address)
    }
}
