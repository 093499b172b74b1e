//! Routing primitives shared by both routers.

use crate::error::Result;
use crate::membership;
use crate::ring::RingContext;
use corelib::{Address, RingNode, Token};
use std::sync::Arc;
use streaming::{Message, MessageType, Payload};
use tracing::{debug, warn};

/// The node a router acts for and the ring it belongs to.
#[derive(Clone)]
pub struct RouterContext {
    node: Arc<RingNode>,
    ring: Arc<RingContext>,
}

impl RouterContext {
    pub fn new(node: Arc<RingNode>, ring: Arc<RingContext>) -> Self {
        Self { node, ring }
    }

    pub fn node(&self) -> &Arc<RingNode> {
        &self.node
    }

    pub fn ring(&self) -> &Arc<RingContext> {
        &self.ring
    }

    pub fn me(&self) -> Address {
        self.node.address()
    }

    pub fn key_token(&self, msg: &Message) -> Result<Token> {
        Ok(msg.key_token(self.node.settings().partitioner.as_ref())?)
    }

    pub fn is_responsible(&self, token: Token) -> bool {
        self.node.is_responsible(token)
    }

    /// Nodes a chain started here may visit. Never more than the ring holds,
    /// so a chain cannot come back to a node it has already locked.
    pub fn chain_length(&self, countdown: usize) -> usize {
        countdown.min(self.ring.directory().len()).max(1)
    }

    pub async fn send(&self, msg: &Message) -> Result<()> {
        debug!(node = self.node.serial(), %msg, "send");
        Ok(self.ring.sender().send(msg).await?)
    }

    /// Sends `msg` on to the successor.
    pub async fn forward(&self, msg: &Message) -> Result<()> {
        let next = msg.forwarded(self.me(), self.node.successor().address);
        self.send(&next).await
    }

    /// Answers `msg` through its origin, which relays to the client.
    /// Nothing is sent when no reply is expected.
    pub async fn reply(&self, msg: &Message, success: bool, value: Option<String>) -> Result<()> {
        let Some(client) = msg.reply_to else {
            return Ok(());
        };
        let to = if msg.origin == self.me() {
            client
        } else {
            msg.origin
        };
        if !success {
            warn!(node = self.node.serial(), kind = %msg.kind, key = msg.key(), "operation failed");
        }
        self.send(&msg.reply(success, self.me(), to, value)).await
    }

    /// Answers the client directly.
    pub async fn reply_direct(
        &self,
        msg: &Message,
        success: bool,
        value: Option<String>,
    ) -> Result<()> {
        match msg.reply_to {
            Some(client) => self.send(&msg.reply(success, self.me(), client, value)).await,
            None => Ok(()),
        }
    }

    /// OK/FAIL passing through the origin.
    pub async fn relay_reply(&self, msg: &Message) -> Result<()> {
        match msg.reply_to {
            Some(client) => self.send(&msg.forwarded(self.me(), client)).await,
            None => Ok(()),
        }
    }

    /// Full-ring dump: every node appends its tables, the origin answers once
    /// the message has gone round.
    pub async fn wildcard(&self, msg: &Message) -> Result<()> {
        let ring_size = self.ring.directory().len();
        let completed = msg.origin == self.me() && msg.hops > 0;
        if completed || msg.hops > ring_size + 1 {
            if !completed {
                warn!(node = self.node.serial(), hops = msg.hops, "wildcard query circulated too long");
            }
            return self
                .reply_direct(msg, true, msg.value().map(str::to_string))
                .await;
        }

        let dump = self.node.special_query();
        let value = match msg.value() {
            Some(acc) if !acc.is_empty() => format!("{acc}\n{dump}"),
            _ => dump,
        };
        let next = msg
            .clone()
            .with_value(Some(value))
            .with_hops(msg.hops + 1);
        self.forward(&next).await
    }

    pub async fn join(&self, msg: &Message) -> Result<()> {
        membership::join(self, msg).await
    }

    pub async fn depart(&self, msg: &Message) -> Result<()> {
        membership::depart(self, msg).await
    }

    /// UNLOCK for a chain of `locks` nodes starting at `head`.
    /// Carries the chain's key so every holder releases the lock for it.
    pub(crate) fn unlock_message(&self, msg: &Message, head: Address, locks: usize) -> Message {
        let key = msg.key().unwrap_or_default();
        let mut unlock = Message::internal(MessageType::Unlock, self.me(), head, Payload::key(key))
            .with_countdown(locks);
        unlock.hashed = msg.hashed;
        unlock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::partitioner::ByteOrderedPartitioner;
    use corelib::{Consistency, NodeSettings};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use streaming::protocol::WILDCARD;
    use streaming::StreamReceiver;

    fn single_node() -> RouterContext {
        let settings = NodeSettings {
            replication_factor: 1,
            consistency: Consistency::Eventual,
            partitioner: Arc::new(ByteOrderedPartitioner),
        };
        let ring = Arc::new(RingContext::new(
            settings.clone(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
        ));
        // nothing listens on port 1, so any forward would fail
        let node = Arc::new(RingNode::new(0, Address::localhost(1), settings));
        ring.directory().register(Arc::clone(&node)).unwrap();
        RouterContext::new(node, ring)
    }

    #[tokio::test]
    async fn test_wildcard_past_hop_limit_is_answered_not_forwarded() {
        let ctx = single_node();
        let client = StreamReceiver::bind(Address::localhost(0)).await.unwrap();
        // entered the ring elsewhere and has already gone round too often
        let msg = Message::request(
            MessageType::Query,
            client.local_addr(),
            Address::localhost(2),
            Payload::key(WILDCARD),
        )
        .with_value(Some("node 9 [elsewhere]: {}".to_string()))
        .with_hops(5);
        assert_ne!(msg.origin, ctx.me());

        ctx.wildcard(&msg).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .expect("reply should arrive")
            .unwrap();
        assert_eq!(reply.kind, MessageType::Ok);
        // answered with the accumulated dump, this node's tables not appended
        assert_eq!(reply.value(), Some("node 9 [elsewhere]: {}"));
    }

    #[test]
    fn test_unlock_message_keeps_hashed_key() {
        let ctx = single_node();
        let token = Token(0x2a);
        let mut msg = Message::internal(
            MessageType::InsertReplica,
            ctx.me(),
            ctx.me(),
            Payload::pair(token.to_string(), "v"),
        );
        msg.hashed = true;

        let unlock = ctx.unlock_message(&msg, Address::localhost(3), 2);
        assert_eq!(unlock.kind, MessageType::Unlock);
        assert_eq!(unlock.to, Address::localhost(3));
        assert_eq!(unlock.countdown, 2);
        assert_eq!(ctx.key_token(&unlock).unwrap(), token);
    }
}
