//! Request routers.
//!
//! A router consumes one inbound message and decides whether the node serves
//! it locally, forwards it to its successor, or starts replication. Two
//! disciplines exist:
//!
//! - **EventualRouter**: replicas are written fire-and-forget along the
//!   successor chain; reads may observe stale copies
//! - **LinearRouter**: writes and reads walk the chain under per-node locks
//!   and the chain tail answers, released by an UNLOCK cascade

mod context;
pub mod eventual;
pub mod linear;

pub use context::RouterContext;
pub use eventual::EventualRouter;
pub use linear::LinearRouter;

use crate::error::Result;
use async_trait::async_trait;
use corelib::Consistency;
use std::sync::Arc;
use streaming::Message;

/// Per-message state machine of a node.
///
/// # Thread Safety
///
/// A service runs one `route` call per accepted connection, so many calls
/// may be in flight on the same node at once.
#[async_trait]
pub trait RequestRouter: Send + Sync + 'static {
    /// Handles `msg` on behalf of `ctx.node()`.
    ///
    /// Operation failures become FAIL replies. Errors returned here are
    /// infrastructure failures and abandon the operation.
    async fn route(&self, ctx: &RouterContext, msg: Message) -> Result<()>;

    /// Router name for logging.
    fn name(&self) -> &'static str;
}

pub fn router_for(consistency: Consistency) -> Arc<dyn RequestRouter> {
    match consistency {
        Consistency::Eventual => Arc::new(EventualRouter),
        Consistency::Linearizable => Arc::new(LinearRouter),
    }
}
