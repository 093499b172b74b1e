//! Eventual replication.
//!
//! The responsible node applies a write, answers the client, and hands a
//! replica copy to its successor. Replica messages walk the chain with a
//! decreasing countdown and are never acknowledged.

use crate::error::Result;
use crate::strategy::{RequestRouter, RouterContext};
use async_trait::async_trait;
use corelib::{Record, Token};
use streaming::{Message, MessageType};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct EventualRouter;

impl EventualRouter {
    async fn serve(&self, ctx: &RouterContext, msg: &Message, token: Token) -> Result<()> {
        let node = ctx.node();
        match msg.kind {
            MessageType::Insert | MessageType::Delete => {
                let ok = match msg.kind {
                    MessageType::Insert => {
                        let key = &msg.payload()?.key;
                        node.insert(token, Record::new(key.as_str(), msg.value().unwrap_or_default()))
                    }
                    _ => node.delete(&token),
                };
                let replied = ctx.reply(msg, ok, None).await;

                let chain = ctx.chain_length(msg.countdown);
                if ok && chain > 1 {
                    if let Some(kind) = msg.kind.replica() {
                        let copy = msg.retyped(kind).with_countdown(chain - 1);
                        ctx.forward(&copy).await?;
                    }
                }
                replied
            }
            MessageType::Query => {
                let value = node.query(&token);
                ctx.reply(msg, value.is_some(), value).await
            }
            MessageType::Join => ctx.join(msg).await,
            MessageType::Depart => ctx.depart(msg).await,
            _ => Ok(()),
        }
    }

    async fn replicate(&self, ctx: &RouterContext, msg: &Message) -> Result<()> {
        let node = ctx.node();
        let token = ctx.key_token(msg)?;
        let applied = match msg.kind {
            MessageType::InsertReplica => {
                let key = &msg.payload()?.key;
                node.insert_replica(token, Record::new(key.as_str(), msg.value().unwrap_or_default()))
            }
            _ => node.delete_replica(&token),
        };
        debug!(node = node.serial(), kind = %msg.kind, applied, "replica applied");

        let remaining = ctx.chain_length(msg.countdown) - 1;
        if remaining >= 1 {
            ctx.forward(&msg.clone().with_countdown(remaining)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RequestRouter for EventualRouter {
    async fn route(&self, ctx: &RouterContext, msg: Message) -> Result<()> {
        if msg.is_wildcard() {
            return ctx.wildcard(&msg).await;
        }

        match msg.kind {
            MessageType::Ok | MessageType::Fail => ctx.relay_reply(&msg).await,
            MessageType::InsertReplica | MessageType::DeleteReplica => {
                if ctx.node().has_departed() {
                    // copy belongs to the node that took over this one's data
                    return ctx.forward(&msg).await;
                }
                self.replicate(ctx, &msg).await
            }
            MessageType::QueryReplica | MessageType::Unlock => {
                warn!(node = ctx.node().serial(), %msg, "dropping chain message on an eventual node");
                Ok(())
            }
            MessageType::Insert
            | MessageType::Delete
            | MessageType::Query
            | MessageType::Join
            | MessageType::Depart => {
                let token = ctx.key_token(&msg)?;
                if ctx.is_responsible(token) {
                    return self.serve(ctx, &msg, token).await;
                }

                if msg.kind == MessageType::Query {
                    if let Some(value) = ctx.node().query_replica(&token) {
                        debug!(node = ctx.node().serial(), key = msg.key(), "answered from replica");
                        return ctx.reply(&msg, true, Some(value)).await;
                    }
                }
                ctx.forward(&msg).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "eventual"
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

    fn single_node(rf: usize) -> RouterContext {
        let settings = NodeSettings {
            replication_factor: rf,
            consistency: Consistency::Eventual,
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
    async fn test_insert_without_reply_address_stays_local() {
        let ctx = single_node(3);
        let router = EventualRouter;
        // ring of one caps the chain, so nothing leaves the node
        router
            .route(&ctx, internal(MessageType::Insert, Payload::pair("k", "v")).with_countdown(3))
            .await
            .unwrap();

        let token = ByteOrderedPartitioner.partition_str("k");
        assert_eq!(ctx.node().query(&token), Some("v".to_string()));
        assert!(ctx.node().replicas().is_empty());
    }

    #[tokio::test]
    async fn test_last_replica_applies_without_forwarding() {
        let ctx = single_node(2);
        EventualRouter
            .route(&ctx, internal(MessageType::InsertReplica, Payload::pair("k", "v")))
            .await
            .unwrap();
        let token = ByteOrderedPartitioner.partition_str("k");
        assert_eq!(ctx.node().query_replica(&token), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_chain_messages_are_dropped() {
        let ctx = single_node(2);
        EventualRouter
            .route(&ctx, internal(MessageType::Unlock, Payload::key("k")))
            .await
            .unwrap();
        assert_eq!(ctx.node().held_locks(), 0);
    }
}
