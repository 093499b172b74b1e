//! Chained replication.
//!
//! Every node on a write chain holds the lock for the written key from the
//! moment it applies the write until the UNLOCK for that chain reaches it. The
//! tail answers the client and sends the UNLOCK to the chain head, which walks
//! the same successors releasing `locks_held` locks. Reads lock the key at the
//! node they visit and are answered by the tail, so they never overtake a
//! chained write. Chains for different keys never share a lock.

use crate::error::Result;
use crate::strategy::{RequestRouter, RouterContext};
use async_trait::async_trait;
use corelib::{Record, Token};
use streaming::{Message, MessageType};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct LinearRouter;

impl LinearRouter {
    /// Write at the chain head.
    async fn write(&self, ctx: &RouterContext, msg: &Message, token: Token) -> Result<()> {
        let node = ctx.node();
        node.acquire_lock(token).await;
        let ok = match apply(ctx, msg, token, false) {
            Ok(ok) => ok,
            Err(err) => return release_on_error(ctx, token, Err(err)),
        };

        let chain = ctx.chain_length(msg.countdown);
        if chain > 1 {
            if let Some(kind) = msg.kind.replica() {
                let next = msg
                    .retyped(kind)
                    .with_countdown(chain - 1)
                    .with_responsible(ctx.me())
                    .with_locks_held(1);
                // lock stays held until the UNLOCK comes back
                return release_on_error(ctx, token, ctx.forward(&next).await);
            }
        }

        let replied = ctx.reply(msg, ok, None).await;
        node.release_lock(token);
        replied
    }

    /// Write at a downstream replica.
    async fn replicate(&self, ctx: &RouterContext, msg: &Message) -> Result<()> {
        let node = ctx.node();
        let token = ctx.key_token(msg)?;
        node.acquire_lock(token).await;
        let held = msg.locks_held + 1;
        let ok = match apply(ctx, msg, token, true) {
            Ok(ok) => ok,
            Err(err) => return release_on_error(ctx, token, Err(err)),
        };

        let remaining = ctx.chain_length(msg.countdown);
        if remaining > 1 {
            let next = msg
                .clone()
                .with_countdown(remaining - 1)
                .with_locks_held(held);
            return release_on_error(ctx, token, ctx.forward(&next).await);
        }

        // tail of the chain
        let replied = ctx.reply(msg, ok, None).await;
        match msg.responsible {
            Some(head) if held > 1 => {
                debug!(node = node.serial(), locks = held, %head, "chain complete, unlocking");
                let unlock = ctx.unlock_message(msg, head, held);
                release_on_error(ctx, token, ctx.send(&unlock).await)?;
            }
            _ => {
                node.release_lock(token);
            }
        }
        replied
    }

    async fn unlock(&self, ctx: &RouterContext, msg: &Message) -> Result<()> {
        let token = ctx.key_token(msg)?;
        if !ctx.node().release_lock(token) {
            warn!(node = ctx.node().serial(), %token, "UNLOCK for a key that was not locked");
        }
        if msg.countdown > 1 {
            ctx.forward(&msg.clone().with_countdown(msg.countdown - 1))
                .await?;
        }
        Ok(())
    }

    /// Read at the responsible node.
    async fn read(&self, ctx: &RouterContext, msg: &Message, token: Token) -> Result<()> {
        let node = ctx.node();
        node.acquire_lock(token).await;
        let chain = ctx.chain_length(msg.countdown);
        let result = if chain > 1 {
            let next = msg
                .retyped(MessageType::QueryReplica)
                .with_countdown(chain - 1);
            ctx.forward(&next).await
        } else {
            let value = node.query(&token);
            ctx.reply(msg, value.is_some(), value).await
        };
        node.release_lock(token);
        result
    }

    /// Read at a downstream replica; the last one answers.
    async fn read_replica(&self, ctx: &RouterContext, msg: &Message) -> Result<()> {
        let node = ctx.node();
        let token = ctx.key_token(msg)?;
        node.acquire_lock(token).await;
        let remaining = ctx.chain_length(msg.countdown);
        let result = if remaining > 1 {
            ctx.forward(&msg.clone().with_countdown(remaining - 1)).await
        } else {
            let value = node.query_replica(&token);
            ctx.reply(msg, value.is_some(), value).await
        };
        node.release_lock(token);
        result
    }
}

/// Applies an insert or delete to the primary or replica table.
fn apply(ctx: &RouterContext, msg: &Message, token: Token, replica: bool) -> Result<bool> {
    let node = ctx.node();
    let ok = match (msg.kind, replica) {
        (MessageType::Insert, false) | (MessageType::InsertReplica, true) => {
            let payload = msg.payload()?;
            let record = Record::new(payload.key.as_str(), msg.value().unwrap_or_default());
            if replica {
                node.insert_replica(token, record)
            } else {
                node.insert(token, record)
            }
        }
        (_, false) => node.delete(&token),
        (_, true) => node.delete_replica(&token),
    };
    Ok(ok)
}

fn release_on_error(ctx: &RouterContext, token: Token, result: Result<()>) -> Result<()> {
    if result.is_err() {
        ctx.node().release_lock(token);
    }
    result
}

#[async_trait]
impl RequestRouter for LinearRouter {
    async fn route(&self, ctx: &RouterContext, msg: Message) -> Result<()> {
        if msg.is_wildcard() {
            return ctx.wildcard(&msg).await;
        }

        if msg.kind.is_replica() && ctx.node().has_departed() {
            // chain continues at the node that took over this one's data
            return ctx.forward(&msg).await;
        }

        match msg.kind {
            MessageType::Ok | MessageType::Fail => ctx.relay_reply(&msg).await,
            MessageType::InsertReplica | MessageType::DeleteReplica => {
                self.replicate(ctx, &msg).await
            }
            MessageType::QueryReplica => self.read_replica(ctx, &msg).await,
            MessageType::Unlock => self.unlock(ctx, &msg).await,
            MessageType::Insert
            | MessageType::Delete
            | MessageType::Query
            | MessageType::Join
            | MessageType::Depart => {
                let token = ctx.key_token(&msg)?;
                if !ctx.is_responsible(token) {
                    return ctx.forward(&msg).await;
                }
                match msg.kind {
                    MessageType::Insert | MessageType::Delete => self.write(ctx, &msg, token).await,
                    MessageType::Query => self.read(ctx, &msg, token).await,
                    MessageType::Join => ctx.join(&msg).await,
                    _ => ctx.depart(&msg).await,
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "linearizable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::RingContext;
    use corelib::partitioner::ByteOrderedPartitioner;
    use corelib::{Address, Consistency, NodeSettings, Partitioner, RingNode};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use streaming::Payload;

    fn single_node() -> RouterContext {
        let settings = NodeSettings {
            replication_factor: 2,
            consistency: Consistency::Linearizable,
            partitioner: Arc::new(ByteOrderedPartitioner),
        };
        let ring = Arc::new(RingContext::new(
            settings.clone(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
        ));
        let node = Arc::new(RingNode::new(0, Address::localhost(1), settings));
        ring.directory().register(Arc::clone(&node)).unwrap();
        RouterContext::new(node, ring)
    }

    fn internal(kind: MessageType, payload: Payload) -> Message {
        Message::internal(kind, Address::localhost(2), Address::localhost(1), payload)
    }

    #[tokio::test]
    async fn test_single_node_write_releases_lock() {
        let ctx = single_node();
        LinearRouter
            .route(&ctx, internal(MessageType::Insert, Payload::pair("k", "v")).with_countdown(2))
            .await
            .unwrap();
        let token = ByteOrderedPartitioner.partition_str("k");
        assert_eq!(ctx.node().query(&token), Some("v".to_string()));
        assert_eq!(ctx.node().held_locks(), 0);
    }

    #[tokio::test]
    async fn test_tail_without_remote_holders_releases_locally() {
        let ctx = single_node();
        let msg = internal(MessageType::InsertReplica, Payload::pair("k", "v"))
            .with_responsible(Address::localhost(1));
        LinearRouter.route(&ctx, msg).await.unwrap();
        assert_eq!(ctx.node().held_locks(), 0);
        let token = ByteOrderedPartitioner.partition_str("k");
        assert_eq!(ctx.node().query_replica(&token), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_unlock_releases_held_lock() {
        let ctx = single_node();
        let token = ByteOrderedPartitioner.partition_str("k");
        assert!(ctx.node().try_lock(token));
        assert!(ctx.node().try_lock(ByteOrderedPartitioner.partition_str("other")));
        LinearRouter
            .route(&ctx, internal(MessageType::Unlock, Payload::key("k")))
            .await
            .unwrap();
        assert!(!ctx.node().is_locked(token));
        // other keys are untouched
        assert_eq!(ctx.node().held_locks(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_absent_key_releases_lock() {
        let ctx = single_node();
        LinearRouter
            .route(&ctx, internal(MessageType::Delete, Payload::key("missing")))
            .await
            .unwrap();
        assert_eq!(ctx.node().held_locks(), 0);
    }
}
