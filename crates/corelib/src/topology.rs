//! Ring topology.
//!
//! The [`Directory`] is the arena of live nodes, indexed by address. Nodes
//! only store [`Peer`] values for their neighbours; every relink goes through
//! the directory so the three nodes touched by a join or depart are updated
//! under one relink guard.

use crate::error::{Error, Result};
use crate::network::Address;
use crate::node::{Neighbors, Peer, RingNode};
use crate::token::Token;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct Directory {
    nodes: DashMap<Address, Arc<RingNode>>,
    relink: Mutex<()>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the arena without linking it.
    pub fn register(&self, node: Arc<RingNode>) -> Result<()> {
        if self.contains_token(node.token()) {
            return Err(Error::DuplicateToken(node.token()));
        }
        if self.nodes.contains_key(&node.address()) {
            return Err(Error::Topology(format!(
                "address {} already registered",
                node.address()
            )));
        }
        debug!(serial = node.serial(), token = %node.token(), "registered node");
        self.nodes.insert(node.address(), node);
        Ok(())
    }

    pub fn deregister(&self, address: &Address) -> Option<Arc<RingNode>> {
        self.nodes.remove(address).map(|(_, node)| node)
    }

    pub fn get(&self, address: &Address) -> Option<Arc<RingNode>> {
        self.nodes.get(address).map(|entry| Arc::clone(entry.value()))
    }

    pub fn find_serial(&self, serial: u64) -> Option<Arc<RingNode>> {
        self.nodes
            .iter()
            .find(|entry| entry.value().serial() == serial)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains_token(&self, token: Token) -> bool {
        self.nodes.iter().any(|entry| entry.value().token() == token)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every live node, sorted by token.
    pub fn nodes(&self) -> Vec<Arc<RingNode>> {
        let mut nodes: Vec<Arc<RingNode>> = self
            .nodes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        nodes.sort_by_key(|node| node.token());
        nodes
    }

    /// Links every registered node into one cycle sorted by token.
    pub fn link_sorted(&self) -> Result<()> {
        let _guard = self.relink.lock();
        let nodes = self.nodes();
        if nodes.is_empty() {
            return Err(Error::Topology("cannot link an empty ring".into()));
        }

        let n = nodes.len();
        for (i, node) in nodes.iter().enumerate() {
            node.set_neighbors(Neighbors {
                predecessor: nodes[(i + n - 1) % n].as_peer(),
                successor: nodes[(i + 1) % n].as_peer(),
            });
        }
        info!(nodes = n, "ring linked");
        Ok(())
    }

    /// Registers `new` and links it between `anchor.predecessor` and `anchor`.
    pub fn splice_before(&self, anchor: &RingNode, new: &Arc<RingNode>) -> Result<()> {
        let _guard = self.relink.lock();
        let pred_peer = anchor.predecessor();
        let predecessor = self
            .get(&pred_peer.address)
            .ok_or(Error::UnknownNode(pred_peer.address))?;
        if !new.token().within(pred_peer.token, anchor.token()) || new.token() == anchor.token() {
            return Err(Error::Topology(format!(
                "node{} does not belong before node{}",
                new.serial(),
                anchor.serial()
            )));
        }
        self.register(Arc::clone(new))?;

        new.set_neighbors(Neighbors {
            predecessor: pred_peer,
            successor: anchor.as_peer(),
        });
        // in a ring of one, predecessor and anchor are the same node
        predecessor.set_successor(new.as_peer());
        anchor.set_predecessor(new.as_peer());

        info!(
            serial = new.serial(),
            predecessor = pred_peer.serial,
            successor = anchor.serial(),
            "node spliced into ring"
        );
        Ok(())
    }

    /// Removes `node` from the cycle and the arena and marks it departed. The
    /// node keeps its own pointers, so messages still in flight to it are
    /// forwarded to its successor instead of being stored.
    pub fn unlink(&self, node: &RingNode) -> Result<()> {
        let _guard = self.relink.lock();
        let Neighbors {
            predecessor,
            successor,
        } = node.neighbors();
        if successor.address == node.address() {
            return Err(Error::Topology("cannot unlink the last node".into()));
        }

        let pred_node = self
            .get(&predecessor.address)
            .ok_or(Error::UnknownNode(predecessor.address))?;
        let succ_node = self
            .get(&successor.address)
            .ok_or(Error::UnknownNode(successor.address))?;

        node.mark_departed();
        pred_node.set_successor(successor);
        succ_node.set_predecessor(predecessor);
        self.deregister(&node.address());

        info!(
            serial = node.serial(),
            predecessor = predecessor.serial,
            successor = successor.serial,
            "node unlinked from ring"
        );
        Ok(())
    }

    /// Follows successor pointers from `start` until the walk returns to it.
    pub fn walk(&self, start: &Address) -> Result<Vec<Peer>> {
        let first = self.get(start).ok_or(Error::UnknownNode(*start))?;
        let mut order = vec![first.as_peer()];
        let mut next = first.successor();

        while next.address != *start {
            if order.len() > self.len() {
                return Err(Error::Topology("successor walk does not close".into()));
            }
            let node = self
                .get(&next.address)
                .ok_or(Error::UnknownNode(next.address))?;
            order.push(node.as_peer());
            next = node.successor();
        }
        Ok(order)
    }

    /// Checks the ring invariants: one cycle through every node, sorted by
    /// token, with `predecessor.successor == self == successor.predecessor`.
    pub fn verify(&self) -> Result<()> {
        let nodes = self.nodes();
        let Some(smallest) = nodes.first() else {
            return Ok(());
        };

        let order = self.walk(&smallest.address())?;
        if order.len() != nodes.len() {
            return Err(Error::Topology(format!(
                "cycle covers {} of {} nodes",
                order.len(),
                nodes.len()
            )));
        }
        if order.windows(2).any(|pair| pair[0].token >= pair[1].token) {
            return Err(Error::Topology("cycle is not sorted by token".into()));
        }

        for node in &nodes {
            let Neighbors {
                predecessor,
                successor,
            } = node.neighbors();
            let pred = self
                .get(&predecessor.address)
                .ok_or(Error::UnknownNode(predecessor.address))?;
            let succ = self
                .get(&successor.address)
                .ok_or(Error::UnknownNode(successor.address))?;
            if pred.successor().address != node.address()
                || succ.predecessor().address != node.address()
            {
                return Err(Error::Topology(format!(
                    "asymmetric links around node{}",
                    node.serial()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Consistency, NodeSettings};
    use crate::partitioner::ByteOrderedPartitioner;

    fn node(serial: u64) -> Arc<RingNode> {
        let settings = NodeSettings {
            replication_factor: 1,
            consistency: Consistency::Eventual,
            partitioner: Arc::new(ByteOrderedPartitioner),
        };
        Arc::new(RingNode::new(
            serial,
            Address::localhost(7000 + serial as u16),
            settings,
        ))
    }

    fn ring(serials: &[u64]) -> Directory {
        let directory = Directory::new();
        for &serial in serials {
            directory.register(node(serial)).unwrap();
        }
        directory.link_sorted().unwrap();
        directory
    }

    fn serials(order: &[Peer]) -> Vec<u64> {
        order.iter().map(|peer| peer.serial).collect()
    }

    #[test]
    fn test_link_sorted_builds_one_cycle() {
        let directory = ring(&[3, 1, 2]);
        directory.verify().unwrap();
        let start = directory.find_serial(1).unwrap().address();
        assert_eq!(serials(&directory.walk(&start).unwrap()), vec![1, 2, 3]);

        let smallest = directory.find_serial(1).unwrap();
        assert_eq!(smallest.predecessor().serial, 3);
    }

    #[test]
    fn test_duplicate_token_is_rejected() {
        let directory = ring(&[1]);
        let err = directory.register(node(1)).unwrap_err();
        assert!(matches!(err, Error::DuplicateToken(_)));
    }

    #[test]
    fn test_splice_before_relinks_three_nodes() {
        let directory = ring(&[1, 3]);
        let anchor = directory.find_serial(3).unwrap();
        let joined = node(2);
        directory.splice_before(&anchor, &joined).unwrap();

        directory.verify().unwrap();
        assert_eq!(joined.predecessor().serial, 1);
        assert_eq!(joined.successor().serial, 3);
        assert_eq!(anchor.predecessor().serial, 2);
        assert_eq!(directory.find_serial(1).unwrap().successor().serial, 2);
    }

    #[test]
    fn test_splice_into_ring_of_one() {
        let directory = ring(&[5]);
        let anchor = directory.find_serial(5).unwrap();
        let joined = node(2);
        directory.splice_before(&anchor, &joined).unwrap();
        directory.verify().unwrap();
        assert_eq!(anchor.successor().serial, 2);
        assert_eq!(anchor.predecessor().serial, 2);
    }

    #[test]
    fn test_splice_rejects_wrong_position() {
        let directory = ring(&[1, 3]);
        let anchor = directory.find_serial(3).unwrap();
        // serial 4 belongs before 1 (wrapping), not before 3
        assert!(directory.splice_before(&anchor, &node(4)).is_err());
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_unlink_closes_the_gap() {
        let directory = ring(&[1, 2, 3]);
        let leaving = directory.find_serial(2).unwrap();
        directory.unlink(&leaving).unwrap();

        directory.verify().unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.find_serial(1).unwrap().successor().serial, 3);
        assert_eq!(directory.find_serial(3).unwrap().predecessor().serial, 1);
        // the departed node still knows where to forward stragglers
        assert_eq!(leaving.successor().serial, 3);
    }

    #[test]
    fn test_unlink_refuses_last_node() {
        let directory = ring(&[1]);
        let only = directory.find_serial(1).unwrap();
        assert!(directory.unlink(&only).is_err());
        assert_eq!(directory.len(), 1);
    }
}
