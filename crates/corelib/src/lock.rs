//! Chain locks for chained (linearizable) replication.
//!
//! A node keeps one [`ChainLock`] per key token in a [`KeyedLocks`] table, so
//! chains for different keys never wait on each other. Chains for the same key
//! all start at the same head and lock head to tail in ring order.
//!
//! A lock is held across handlers: one handler acquires it when it applies
//! a chained write and a later handler releases it when the UNLOCK for that
//! sequence arrives. It therefore cannot be a guard-scoped mutex. Waiters
//! park on a [`Notify`] instead of spinning.

use crate::token::Token;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug, Default)]
pub struct ChainLock {
    held: AtomicBool,
    released: Notify,
}

impl ChainLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking attempt. Returns true if the lock was free and is now held.
    pub fn try_lock(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Waits until the lock is acquired.
    pub async fn acquire(&self) {
        loop {
            if self.try_lock() {
                return;
            }
            trace!("chain lock busy, waiting for release");
            // a release between the failed attempt and this await leaves a
            // stored permit, so the wakeup is not lost
            self.released.notified().await;
        }
    }

    /// Releases the lock. Returns false if it was not held.
    pub fn release(&self) -> bool {
        let was_held = self.held.swap(false, Ordering::AcqRel);
        if was_held {
            self.released.notify_one();
        }
        was_held
    }

    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Chain locks keyed by token, created on first use.
///
/// Entries are never removed: a waiter may still hold the `Arc` of a released
/// lock, and replacing the entry would let two chains hold the same key.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<Token, Arc<ChainLock>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, token: Token) -> Arc<ChainLock> {
        // cloned out so no shard guard lives across an await
        Arc::clone(self.locks.entry(token).or_default().value())
    }

    pub fn try_lock(&self, token: Token) -> bool {
        self.lock_for(token).try_lock()
    }

    pub async fn acquire(&self, token: Token) {
        let lock = self.lock_for(token);
        lock.acquire().await
    }

    /// Returns false if the key was not locked.
    pub fn release(&self, token: Token) -> bool {
        match self.locks.get(&token) {
            Some(lock) => lock.release(),
            None => false,
        }
    }

    pub fn is_locked(&self, token: Token) -> bool {
        self.locks
            .get(&token)
            .map(|lock| lock.is_locked())
            .unwrap_or(false)
    }

    /// Number of keys currently locked.
    pub fn held(&self) -> usize {
        self.locks.iter().filter(|lock| lock.is_locked()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_try_lock_is_exclusive() {
        let lock = ChainLock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        assert!(lock.release());
        assert!(!lock.release());
        assert!(lock.try_lock());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release_from_another_task() {
        let lock = Arc::new(ChainLock::new());
        lock.acquire().await;

        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.acquire().await;
                true
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        lock.release();
        let acquired = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
        assert!(acquired);
        assert!(lock.is_locked());
    }

    #[tokio::test]
    async fn test_waiters_are_served_one_at_a_time() {
        let lock = Arc::new(ChainLock::new());
        let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            handles.push(tokio::spawn(async move {
                lock.acquire().await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                assert_eq!(now, 1, "two holders at once");
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                lock.release();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_keyed_locks_are_independent() {
        let locks = KeyedLocks::new();
        assert!(locks.try_lock(Token(1)));
        assert!(locks.try_lock(Token(2)));
        assert!(!locks.try_lock(Token(1)));
        assert_eq!(locks.held(), 2);

        assert!(locks.release(Token(1)));
        assert!(!locks.is_locked(Token(1)));
        assert!(locks.is_locked(Token(2)));
        assert!(!locks.release(Token(3)));
        assert_eq!(locks.held(), 1);
    }

    #[tokio::test]
    async fn test_keyed_acquire_only_waits_on_its_own_key() {
        let locks = Arc::new(KeyedLocks::new());
        locks.acquire(Token(7)).await;

        // a different key is free even while 7 is held
        tokio::time::timeout(Duration::from_secs(1), locks.acquire(Token(8)))
            .await
            .expect("unrelated key should not block");

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire(Token(7)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        assert!(locks.release(Token(7)));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
        assert!(locks.is_locked(Token(7)));
    }
}
