//! Concurrent key/value tables held by a ring node.
//!
//! Entries are keyed by the key's [`Token`]; the raw key travels with the
//! value so records can be migrated and dumped without reversing the hash.

use crate::token::Token;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored key/value pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Table safe for concurrent use by every handler of a node.
#[derive(Debug, Default)]
pub struct Store {
    entries: DashMap<Token, Record>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert. Returns the record that was replaced, if any.
    pub fn insert(&self, token: Token, record: Record) -> Option<Record> {
        self.entries.insert(token, record)
    }

    /// Returns true if an entry existed.
    pub fn remove(&self, token: &Token) -> bool {
        self.entries.remove(token).is_some()
    }

    pub fn get(&self, token: &Token) -> Option<Record> {
        self.entries.get(token).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every record whose token matches `pred`.
    pub fn drain_where<F>(&self, pred: F) -> Vec<(Token, Record)>
    where
        F: Fn(&Token) -> bool,
    {
        // collect first: removing while iterating a DashMap shard deadlocks
        let tokens: Vec<Token> = self
            .entries
            .iter()
            .filter(|entry| pred(entry.key()))
            .map(|entry| *entry.key())
            .collect();

        let mut drained: Vec<(Token, Record)> = tokens
            .into_iter()
            .filter_map(|token| self.entries.remove(&token))
            .collect();
        drained.sort_by_key(|(token, _)| *token);
        drained
    }

    /// Removes and returns everything.
    pub fn drain_all(&self) -> Vec<(Token, Record)> {
        self.drain_where(|_| true)
    }

    /// Copy of every record, sorted by token.
    pub fn snapshot(&self) -> Vec<(Token, Record)> {
        let mut records: Vec<(Token, Record)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        records.sort_by_key(|(token, _)| *token);
        records
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (_, record)) in self.snapshot().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", record.key, record.value)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_upsert() {
        let store = Store::new();
        assert!(store.insert(Token(1), Record::new("a", "first")).is_none());
        let replaced = store.insert(Token(1), Record::new("a", "second"));
        assert_eq!(replaced.map(|r| r.value), Some("first".to_string()));
        assert_eq!(store.get(&Token(1)).unwrap().value, "second");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_reports_presence() {
        let store = Store::new();
        store.insert(Token(7), Record::new("k", "v"));
        assert!(store.remove(&Token(7)));
        assert!(!store.remove(&Token(7)));
        assert!(store.get(&Token(7)).is_none());
    }

    #[test]
    fn test_drain_where_removes_matching_only() {
        let store = Store::new();
        for i in 0..10u128 {
            store.insert(Token(i), Record::new(format!("k{i}"), "v"));
        }
        let drained = store.drain_where(|t| t.0 < 4);
        let tokens: Vec<u128> = drained.iter().map(|(t, _)| t.0).collect();
        assert_eq!(tokens, vec![0, 1, 2, 3]);
        assert_eq!(store.len(), 6);
        assert!(store.get(&Token(2)).is_none());
        assert!(store.get(&Token(4)).is_some());
    }

    #[test]
    fn test_display_lists_records_in_token_order() {
        let store = Store::new();
        store.insert(Token(2), Record::new("b", "2"));
        store.insert(Token(1), Record::new("a", "1"));
        assert_eq!(store.to_string(), "{a=1, b=2}");
        assert_eq!(Store::new().to_string(), "{}");
    }
}
