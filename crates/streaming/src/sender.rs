//! Outbound side of the transport.

use crate::codec;
use crate::error::Result;
use crate::protocol::Message;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Delivers messages to `msg.to`, one connection per message.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamSender;

impl StreamSender {
    pub fn new() -> Self {
        Self
    }

    pub async fn send(&self, msg: &Message) -> Result<()> {
        let mut stream = TcpStream::connect(msg.to.socket_addr()).await?;
        let _ = stream.set_nodelay(true);
        codec::write_frame(&mut stream, msg).await?;
        stream.shutdown().await?;
        trace!(%msg, "sent");
        Ok(())
    }

    /// Sends a batch in order, stopping at the first failure.
    pub async fn send_all(&self, msgs: &[Message]) -> Result<usize> {
        for msg in msgs {
            self.send(msg).await?;
        }
        debug!(count = msgs.len(), "batch sent");
        Ok(msgs.len())
    }
}
