//! Migration batches.
//!
//! Join and depart move table contents between nodes as ordinary
//! INSERT / INSERT_REPLICA messages with raw keys and no reply address.

use crate::protocol::{Message, MessageType, Payload};
use corelib::{Address, Record, Token};

/// Primary records as INSERT messages.
pub fn primary_batch(
    records: &[(Token, Record)],
    from: Address,
    to: Address,
    countdown: usize,
) -> Vec<Message> {
    records
        .iter()
        .map(|(_, record)| {
            Message::internal(MessageType::Insert, from, to, payload(record))
                .with_countdown(countdown)
        })
        .collect()
}

/// Replica records as INSERT_REPLICA messages whose chain starts at `responsible`.
pub fn replica_batch(
    records: &[(Token, Record)],
    from: Address,
    to: Address,
    countdown: usize,
    responsible: Address,
) -> Vec<Message> {
    records
        .iter()
        .map(|(_, record)| {
            Message::internal(MessageType::InsertReplica, from, to, payload(record))
                .with_countdown(countdown)
                .with_responsible(responsible)
        })
        .collect()
}

fn payload(record: &Record) -> Payload {
    Payload::pair(record.key.clone(), record.value.clone())
}
