//! Request client.
//!
//! Every request binds its own ephemeral reply listener, so one `Client` can
//! issue requests concurrently.

use crate::error::{ReplicationError, Result};
use corelib::Address;
use std::net::IpAddr;
use std::time::Duration;
use streaming::protocol::WILDCARD;
use streaming::{Message, MessageType, Payload, StreamReceiver, StreamSender};
use tokio::time::timeout;
use tracing::debug;

/// Outcome of a request as reported by the ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub ok: bool,
    pub key: String,
    pub value: Option<String>,
}

impl Reply {
    fn from_message(msg: Message) -> Self {
        let ok = msg.kind == MessageType::Ok;
        let (key, value) = match msg.data {
            Some(data) => (data.key, data.value),
            None => (String::new(), None),
        };
        Self { ok, key, value }
    }
}

#[derive(Clone, Debug)]
pub struct Client {
    host: IpAddr,
    replication_factor: usize,
    timeout: Duration,
    sender: StreamSender,
}

impl Client {
    pub fn new(host: IpAddr, replication_factor: usize, timeout: Duration) -> Self {
        Self {
            host,
            replication_factor,
            timeout,
            sender: StreamSender::new(),
        }
    }

    /// Sends one request to `entry` and waits for its OK/FAIL.
    pub async fn request(&self, entry: Address, kind: MessageType, data: Payload) -> Result<Reply> {
        let listener = StreamReceiver::bind(Address::new(self.host, 0)).await?;
        let msg = Message::request(kind, listener.local_addr(), entry, data)
            .with_countdown(self.replication_factor);
        debug!(%msg, "request");
        self.sender.send(&msg).await?;

        let reply = timeout(self.timeout, listener.recv())
            .await
            .map_err(|_| ReplicationError::Timeout(self.timeout))??;
        Ok(Reply::from_message(reply))
    }

    pub async fn insert(&self, entry: Address, key: &str, value: &str) -> Result<Reply> {
        self.request(entry, MessageType::Insert, Payload::pair(key, value))
            .await
    }

    pub async fn query(&self, entry: Address, key: &str) -> Result<Reply> {
        self.request(entry, MessageType::Query, Payload::key(key))
            .await
    }

    /// Dump of every node's tables, one line per node in ring order.
    pub async fn query_all(&self, entry: Address) -> Result<Reply> {
        self.query(entry, WILDCARD).await
    }

    pub async fn delete(&self, entry: Address, key: &str) -> Result<Reply> {
        self.request(entry, MessageType::Delete, Payload::key(key))
            .await
    }

    pub async fn join(&self, entry: Address, serial: u64) -> Result<Reply> {
        self.request(entry, MessageType::Join, Payload::key(serial.to_string()))
            .await
    }

    pub async fn depart(&self, entry: Address, serial: u64) -> Result<Reply> {
        self.request(entry, MessageType::Depart, Payload::key(serial.to_string()))
            .await
    }
}
