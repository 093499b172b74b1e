//! Cluster bootstrap harness.
//!
//! Starts `nodes` ring nodes in one process, links them into a sorted cycle
//! before any traffic is accepted, and hands out the bootstrapped node as the
//! entry point for join and depart.

use crate::client::Client;
use crate::error::{ReplicationError, Result};
use crate::ring::RingContext;
use corelib::{Address, Consistency, NodeSettings, PartitionerKind, Peer, RingNode};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use streaming::StreamReceiver;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Nodes started at bootstrap, serials `0..nodes`.
    pub nodes: usize,
    /// Copies per key, including the primary.
    pub replication_factor: usize,
    pub consistency: Consistency,
    pub host: IpAddr,
    /// Node `serial` listens on `base_port + serial`; 0 picks ephemeral ports.
    pub base_port: u16,
    pub partitioner: PartitionerKind,
    pub client_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            replication_factor: 3,
            consistency: Consistency::Eventual,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 64000,
            partitioner: PartitionerKind::Xxh3,
            client_timeout: Duration::from_secs(5),
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            return Err(ReplicationError::Config("at least one node is required".into()));
        }
        if self.replication_factor == 0 {
            return Err(ReplicationError::Config(
                "replication factor must be at least 1".into(),
            ));
        }
        if self.base_port != 0 && usize::from(self.base_port) + self.nodes > usize::from(u16::MAX) {
            return Err(ReplicationError::Config(format!(
                "{} nodes do not fit above base port {}",
                self.nodes, self.base_port
            )));
        }
        if self.client_timeout.is_zero() {
            return Err(ReplicationError::Config("client timeout must be positive".into()));
        }
        Ok(())
    }

    fn settings(&self) -> NodeSettings {
        NodeSettings {
            replication_factor: self.replication_factor,
            consistency: self.consistency,
            partitioner: self.partitioner.build(),
        }
    }
}

pub struct Cluster {
    config: ClusterConfig,
    ring: Arc<RingContext>,
    bootstrap: Arc<RingNode>,
}

impl Cluster {
    pub async fn start(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let settings = config.settings();
        let ring = Arc::new(RingContext::new(settings.clone(), config.host, config.base_port));

        let mut started = Vec::with_capacity(config.nodes);
        for serial in 0..config.nodes as u64 {
            let receiver = StreamReceiver::bind(ring.address_for(serial)?).await?;
            let node = Arc::new(RingNode::new(serial, receiver.local_addr(), settings.clone()));
            ring.directory().register(Arc::clone(&node))?;
            started.push((node, receiver));
        }
        ring.directory().link_sorted()?;

        let bootstrap = Arc::clone(&started[0].0);
        for (node, receiver) in started {
            ring.spawn_node(node, receiver);
        }

        info!(
            nodes = config.nodes,
            replication_factor = config.replication_factor,
            consistency = %config.consistency,
            partitioner = %config.partitioner,
            bootstrap = %bootstrap.address(),
            "cluster started"
        );
        Ok(Self {
            config,
            ring,
            bootstrap,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn ring(&self) -> &Arc<RingContext> {
        &self.ring
    }

    /// Entry point for join and depart.
    pub fn bootstrapped(&self) -> Address {
        self.bootstrap.address()
    }

    /// Addresses of the live nodes, sorted by ring position.
    pub fn addresses(&self) -> Vec<Address> {
        self.ring
            .directory()
            .nodes()
            .iter()
            .map(|node| node.address())
            .collect()
    }

    pub fn node(&self, serial: u64) -> Option<Arc<RingNode>> {
        self.ring.directory().find_serial(serial)
    }

    /// The cycle as seen by walking successors from the bootstrapped node.
    pub fn ring_order(&self) -> Result<Vec<Peer>> {
        Ok(self.ring.directory().walk(&self.bootstrap.address())?)
    }

    /// Refuses to depart the bootstrapped node, which is the join entry point.
    pub fn check_departure(&self, serial: u64) -> Result<()> {
        if serial == self.bootstrap.serial() {
            return Err(ReplicationError::Depart(format!(
                "node {serial} is the bootstrapped node"
            )));
        }
        Ok(())
    }

    pub fn client(&self) -> Client {
        Client::new(
            self.config.host,
            self.config.replication_factor,
            self.config.client_timeout,
        )
    }

    pub fn shutdown(&self) {
        self.ring.shutdown();
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if !self.ring.is_shut_down() {
            self.ring.shutdown();
        }
    }
}
