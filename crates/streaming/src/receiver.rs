//! Inbound side of the transport.

use crate::codec;
use crate::error::Result;
use crate::protocol::Message;
use corelib::Address;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::trace;

/// Listener that yields one message per accepted connection.
#[derive(Debug)]
pub struct StreamReceiver {
    listener: TcpListener,
    local: Address,
}

impl StreamReceiver {
    /// Binds `address`. Port 0 picks an ephemeral port, see [`Self::local_addr`].
    pub async fn bind(address: Address) -> Result<Self> {
        let listener = TcpListener::bind(address.socket_addr()).await?;
        let local = Address::from(listener.local_addr()?);
        Ok(Self { listener, local })
    }

    pub fn local_addr(&self) -> Address {
        self.local
    }

    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        let _ = stream.set_nodelay(true);
        Ok((stream, peer))
    }

    pub async fn read_message(stream: &mut TcpStream) -> Result<Message> {
        let msg = codec::read_frame(stream).await?;
        trace!(%msg, "received");
        Ok(msg)
    }

    /// Accepts the next connection and reads its message.
    pub async fn recv(&self) -> Result<Message> {
        let (mut stream, _) = self.accept().await?;
        Self::read_message(&mut stream).await
    }
}
