//! Wire protocol for the chord ring.
//!
//! This crate provides the protocol and transport primitives shared by
//! nodes and clients:
//! - The message envelope exchanged on every hop
//! - The length-prefixed frame codec
//! - One-message-per-connection sender and receiver
//! - Migration batches for join and depart

pub mod codec;
pub mod error;
pub mod migration;
pub mod protocol;
pub mod receiver;
pub mod sender;

pub use error::{Result, StreamingError};
pub use protocol::{Message, MessageType, Payload};
pub use receiver::StreamReceiver;
pub use sender::StreamSender;
