//! State shared by every node service of one ring.

use crate::error::{ReplicationError, Result};
use crate::service::NodeService;
use corelib::{Address, Directory, NodeSettings, RingNode};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use streaming::{StreamReceiver, StreamSender};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct RingContext {
    directory: Directory,
    sender: StreamSender,
    settings: NodeSettings,
    host: IpAddr,
    base_port: u16,
    /// Serializes whole join and depart sequences.
    topology: Mutex<()>,
    services: DashMap<Address, NodeService>,
    shutdown: CancellationToken,
}

impl RingContext {
    pub fn new(settings: NodeSettings, host: IpAddr, base_port: u16) -> Self {
        Self {
            directory: Directory::new(),
            sender: StreamSender::new(),
            settings,
            host,
            base_port,
            topology: Mutex::new(()),
            services: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn sender(&self) -> &StreamSender {
        &self.sender
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    /// Listening address of node `serial`: `base_port + serial`, or an
    /// ephemeral port when the base port is 0.
    pub fn address_for(&self, serial: u64) -> Result<Address> {
        if self.base_port == 0 {
            return Ok(Address::new(self.host, 0));
        }
        let port = u64::from(self.base_port) + serial;
        let port = u16::try_from(port).map_err(|_| {
            ReplicationError::Config(format!(
                "serial {serial} overflows the port range from base port {}",
                self.base_port
            ))
        })?;
        Ok(Address::new(self.host, port))
    }

    /// Starts the service of `node` on `receiver`.
    pub fn spawn_node(self: &Arc<Self>, node: Arc<RingNode>, receiver: StreamReceiver) {
        let address = node.address();
        let cancel = self.shutdown.child_token();
        let service = NodeService::spawn(Arc::clone(self), node, receiver, cancel);
        self.services.insert(address, service);
    }

    /// Stops the service listening on `address`. In-flight handlers finish.
    pub fn stop_node(&self, address: &Address) -> bool {
        match self.services.remove(address) {
            Some((_, service)) => {
                service.stop();
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        info!(services = self.services.len(), "shutting down ring");
        self.shutdown.cancel();
        self.services.clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) async fn lock_topology(&self) -> MutexGuard<'_, ()> {
        self.topology.lock().await
    }
}
