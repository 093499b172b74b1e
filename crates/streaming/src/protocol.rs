//! Message envelope.
//!
//! A [`Message`] is never mutated while it travels: every hop derives a fresh
//! outbound message from the inbound one with [`Message::forwarded`],
//! [`Message::reply`] or [`Message::retyped`].

use crate::error::{Result, StreamingError};
use corelib::{Address, Partitioner, Token};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key that turns a query into a full-ring dump.
pub const WILDCARD: &str = "*";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Insert,
    Delete,
    Query,
    Join,
    Depart,
    Ok,
    Fail,
    InsertReplica,
    DeleteReplica,
    QueryReplica,
    Unlock,
}

impl MessageType {
    /// OK and FAIL are the only reply types.
    pub fn is_reply(self) -> bool {
        matches!(self, MessageType::Ok | MessageType::Fail)
    }

    pub fn is_replica(self) -> bool {
        matches!(
            self,
            MessageType::InsertReplica | MessageType::DeleteReplica | MessageType::QueryReplica
        )
    }

    /// The replica counterpart of a primary operation.
    pub fn replica(self) -> Option<MessageType> {
        match self {
            MessageType::Insert => Some(MessageType::InsertReplica),
            MessageType::Delete => Some(MessageType::DeleteReplica),
            MessageType::Query => Some(MessageType::QueryReplica),
            _ => None,
        }
    }

    pub fn outcome(success: bool) -> MessageType {
        if success {
            MessageType::Ok
        } else {
            MessageType::Fail
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Insert => "INSERT",
            MessageType::Delete => "DELETE",
            MessageType::Query => "QUERY",
            MessageType::Join => "JOIN",
            MessageType::Depart => "DEPART",
            MessageType::Ok => "OK",
            MessageType::Fail => "FAIL",
            MessageType::InsertReplica => "INSERT_REPLICA",
            MessageType::DeleteReplica => "DELETE_REPLICA",
            MessageType::QueryReplica => "QUERY_REPLICA",
            MessageType::Unlock => "UNLOCK",
        };
        f.write_str(name)
    }
}

/// Key/value carried by a message. Queries and deletes have no value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub key: String,
    pub value: Option<String>,
}

impl Payload {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn pair(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageType,
    /// Node that first received the client request.
    pub origin: Address,
    pub from: Address,
    pub to: Address,
    /// Final client address; `None` when no reply is expected.
    pub reply_to: Option<Address>,
    /// Remaining copies (or hops) for this operation.
    pub countdown: usize,
    /// Whether `data.key` is already a hex ring identifier.
    pub hashed: bool,
    /// Coordinator of a linearizable chain, target of the UNLOCK.
    pub responsible: Option<Address>,
    pub data: Option<Payload>,
    /// Nodes visited by a wildcard query.
    pub hops: usize,
    /// Nodes currently holding their lock for this chain.
    pub locks_held: usize,
}

impl Message {
    /// A client request entering the ring at `entry`.
    pub fn request(kind: MessageType, client: Address, entry: Address, data: Payload) -> Self {
        Self {
            kind,
            origin: entry,
            from: client,
            to: entry,
            reply_to: Some(client),
            countdown: 1,
            hashed: false,
            responsible: None,
            data: Some(data),
            hops: 0,
            locks_held: 0,
        }
    }

    /// Node-to-node traffic that expects no reply.
    pub fn internal(kind: MessageType, from: Address, to: Address, data: Payload) -> Self {
        Self {
            kind,
            origin: from,
            from,
            to,
            reply_to: None,
            countdown: 1,
            hashed: false,
            responsible: None,
            data: Some(data),
            hops: 0,
            locks_held: 0,
        }
    }

    pub fn with_countdown(mut self, countdown: usize) -> Self {
        self.countdown = countdown;
        self
    }

    pub fn with_responsible(mut self, responsible: Address) -> Self {
        self.responsible = Some(responsible);
        self
    }

    pub fn with_hops(mut self, hops: usize) -> Self {
        self.hops = hops;
        self
    }

    pub fn with_locks_held(mut self, locks_held: usize) -> Self {
        self.locks_held = locks_held;
        self
    }

    pub fn with_value(mut self, value: Option<String>) -> Self {
        if let Some(data) = self.data.as_mut() {
            data.value = value;
        }
        self
    }

    /// Same message, next hop.
    pub fn forwarded(&self, from: Address, to: Address) -> Self {
        Self {
            from,
            to,
            ..self.clone()
        }
    }

    /// Same message under another type, addressing untouched.
    pub fn retyped(&self, kind: MessageType) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// OK/FAIL answer carrying this message's key and `value`.
    pub fn reply(&self, success: bool, from: Address, to: Address, value: Option<String>) -> Self {
        Self {
            kind: MessageType::outcome(success),
            from,
            to,
            responsible: None,
            data: Some(Payload {
                key: self.key().unwrap_or_default().to_string(),
                value,
            }),
            ..self.clone()
        }
    }

    pub fn payload(&self) -> Result<&Payload> {
        self.data
            .as_ref()
            .ok_or(StreamingError::MissingPayload(self.kind))
    }

    pub fn key(&self) -> Option<&str> {
        self.data.as_ref().map(|data| data.key.as_str())
    }

    pub fn value(&self) -> Option<&str> {
        self.data.as_ref().and_then(|data| data.value.as_deref())
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == MessageType::Query && self.key() == Some(WILDCARD)
    }

    /// Ring identifier of the carried key, hashing it unless `hashed` is set.
    pub fn key_token(&self, partitioner: &dyn Partitioner) -> Result<Token> {
        let key = &self.payload()?.key;
        if self.hashed {
            Ok(Token::from_hex(key)?)
        } else {
            Ok(partitioner.partition_str(key))
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.kind, self.from, self.to)?;
        if let Some(key) = self.key() {
            write!(f, " key={key}")?;
        }
        if self.countdown != 1 {
            write!(f, " countdown={}", self.countdown)?;
        }
        Ok(())
    }
}
