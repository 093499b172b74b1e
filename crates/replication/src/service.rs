//! Per-node service.
//!
//! The accept loop never handles a message itself: every connection gets its
//! own task that reads one message and routes it, so a handler blocked on a
//! chain lock never stalls the listener.

use crate::ring::RingContext;
use crate::strategy::{router_for, RequestRouter, RouterContext};
use corelib::{Address, RingNode};
use std::sync::Arc;
use streaming::StreamReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug)]
pub struct NodeService {
    address: Address,
    cancel: CancellationToken,
}

impl NodeService {
    pub fn spawn(
        ring: Arc<RingContext>,
        node: Arc<RingNode>,
        receiver: StreamReceiver,
        cancel: CancellationToken,
    ) -> Self {
        let address = node.address();
        let router = router_for(node.consistency());
        let ctx = RouterContext::new(node, ring);
        tokio::spawn(serve(ctx, router, receiver, cancel.clone()));
        Self { address, cancel }
    }

    /// Stops accepting. Handlers already running finish on their own.
    pub fn stop(&self) {
        debug!(address = %self.address, "stopping service");
        self.cancel.cancel();
    }
}

async fn serve(
    ctx: RouterContext,
    router: Arc<dyn RequestRouter>,
    receiver: StreamReceiver,
    cancel: CancellationToken,
) {
    let serial = ctx.node().serial();
    info!(serial, address = %receiver.local_addr(), router = router.name(), "node serving");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = receiver.accept() => match accepted {
                Ok((mut stream, peer)) => {
                    let ctx = ctx.clone();
                    let router = Arc::clone(&router);
                    tokio::spawn(async move {
                        let msg = match StreamReceiver::read_message(&mut stream).await {
                            Ok(msg) => msg,
                            Err(err) => {
                                error!(serial, %peer, error = %err, "failed to read message");
                                return;
                            }
                        };
                        drop(stream);
                        debug!(serial, %msg, "routing");
                        if let Err(err) = router.route(&ctx, msg).await {
                            error!(serial, error = %err, "request abandoned");
                        }
                    });
                }
                Err(err) => error!(serial, error = %err, "accept failed"),
            },
        }
    }

    info!(serial, "node stopped");
}
