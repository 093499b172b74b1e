//! Join and depart.
//!
//! Both run on the node responsible for the serial named in the request and
//! hold the ring topology lock for the whole sequence: relink, start or stop
//! the service, migrate.

use crate::error::{ReplicationError, Result};
use crate::strategy::RouterContext;
use corelib::{Address, RingNode};
use std::sync::Arc;
use streaming::migration::{primary_batch, replica_batch};
use streaming::{Message, StreamReceiver};
use tracing::{info, warn};

fn parse_serial(msg: &Message) -> Result<u64> {
    let key = &msg.payload()?.key;
    key.trim()
        .parse()
        .map_err(|_| ReplicationError::Join(format!("invalid node serial {key:?}")))
}

/// Admits the node named by `msg` before `ctx.node()` and answers the client
/// directly with the new node's address.
pub(crate) async fn join(ctx: &RouterContext, msg: &Message) -> Result<()> {
    let ring = ctx.ring();
    let guard = ring.lock_topology().await;
    match admit(ctx, msg).await {
        Ok(Some(address)) => {
            drop(guard);
            ctx.reply_direct(msg, true, Some(address.to_string())).await
        }
        // a concurrent topology change moved the position elsewhere
        Ok(None) => {
            drop(guard);
            ctx.forward(msg).await
        }
        Err(err) => {
            drop(guard);
            warn!(node = ctx.node().serial(), error = %err, "join failed");
            ctx.reply_direct(msg, false, None).await
        }
    }
}

async fn admit(ctx: &RouterContext, msg: &Message) -> Result<Option<Address>> {
    let ring = ctx.ring();
    let node = ctx.node();
    let serial = parse_serial(msg)?;
    let token = node.settings().partitioner.partition_str(&serial.to_string());

    if token == node.token() || ring.directory().contains_token(token) {
        return Err(ReplicationError::Join(format!(
            "ring position of serial {serial} is taken"
        )));
    }
    if !node.is_responsible(token) {
        return Ok(None);
    }

    let receiver = StreamReceiver::bind(ring.address_for(serial)?).await?;
    let address = receiver.local_addr();
    let joined = Arc::new(RingNode::new(serial, address, node.settings().clone()));
    ring.directory().splice_before(node, &joined)?;
    ring.spawn_node(Arc::clone(&joined), receiver);

    let moved = migrate_to(ctx, &joined).await?;
    info!(serial, %address, moved, "node joined");
    Ok(Some(address))
}

/// Hands `joined` the records it now owns. With replication on, this node
/// keeps them as replica copies and seeds `joined` with its replica table.
async fn migrate_to(ctx: &RouterContext, joined: &RingNode) -> Result<usize> {
    let node = ctx.node();
    let (from, to) = (node.address(), joined.address());

    let replicas = node.replicas().snapshot();
    let moved = node
        .store()
        .drain_where(|token| joined.is_responsible(*token));
    let mut batch = primary_batch(&moved, from, to, 1);

    if node.replication_factor() > 1 {
        for (token, record) in &moved {
            node.insert_replica(*token, record.clone());
        }
        batch.extend(replica_batch(&replicas, from, to, 1, to));
    }

    ctx.ring().sender().send_all(&batch).await?;
    Ok(moved.len())
}

/// Removes `ctx.node()` from the ring, hands every record to its successor
/// and stops the node's service once the reply is out.
pub(crate) async fn depart(ctx: &RouterContext, msg: &Message) -> Result<()> {
    let ring = ctx.ring();
    let guard = ring.lock_topology().await;
    let result = leave(ctx, msg).await;
    drop(guard);

    match result {
        Ok(()) => {
            let replied = ctx.reply(msg, true, None).await;
            ring.stop_node(&ctx.me());
            replied
        }
        Err(err) => {
            warn!(node = ctx.node().serial(), error = %err, "depart failed");
            ctx.reply(msg, false, None).await
        }
    }
}

async fn leave(ctx: &RouterContext, msg: &Message) -> Result<()> {
    let node = ctx.node();
    let serial = parse_serial(msg).map_err(|err| ReplicationError::Depart(err.to_string()))?;
    if serial != node.serial() {
        return Err(ReplicationError::Depart(format!(
            "serial {serial} is not node {}",
            node.serial()
        )));
    }

    // marks the node departed, so new keyed traffic goes to the successor
    ctx.ring().directory().unlink(node)?;
    let successor = node.successor().address;

    let mut sent = hand_off(ctx, successor).await?;
    // writes admitted just before the unlink land after the first drain
    sent += hand_off(ctx, successor).await?;
    info!(serial, successor = %successor, records = sent, "node departed");
    Ok(())
}

/// Drains both tables into `successor`, which re-establishes the replica
/// chain for the primaries.
async fn hand_off(ctx: &RouterContext, successor: Address) -> Result<usize> {
    let node = ctx.node();
    let rf = node.replication_factor();
    let me = ctx.me();

    let primaries = node.store().drain_all();
    let mut batch = primary_batch(&primaries, me, successor, rf);
    if rf > 1 {
        let replicas = node.replicas().drain_all();
        batch.extend(replica_batch(&replicas, me, successor, rf - 1, successor));
    }
    if batch.is_empty() {
        return Ok(0);
    }
    Ok(ctx.ring().sender().send_all(&batch).await?)
}
