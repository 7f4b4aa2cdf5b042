//! Keyed background task bookkeeping
//!
//! Search loops (per user) and acceptance timers (per pair) are tracked here
//! so that at most one task is live per key. Arming a key cancels whatever
//! was armed before; cancellation is cooperative, a task only stops at its
//! next await on the token, never halfway through a store transition.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// Ticket for one armed task
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub generation: u64,
    pub token: CancellationToken,
}

pub(crate) struct TaskTable<K> {
    tasks: DashMap<K, Slot>,
    next_generation: AtomicU64,
}

impl<K: Eq + Hash + Clone> TaskTable<K> {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Arm `key`, cancelling the task previously armed for it
    pub fn arm(&self, key: K) -> Slot {
        let slot = Slot {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        if let Some(previous) = self.tasks.insert(key, slot.clone()) {
            previous.token.cancel();
        }
        slot
    }

    /// Cancel and forget the task armed for `key`
    pub fn cancel(&self, key: &K) -> bool {
        match self.tasks.remove(key) {
            Some((_, slot)) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget `key` if it still refers to the finishing task
    pub fn finish(&self, key: &K, generation: u64) {
        self.tasks.remove_if(key, |_, slot| slot.generation == generation);
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Per-key async mutexes
///
/// Coordinator steps touching a user take that user's lock; steps touching a
/// pair take both in key order so two steps can never deadlock. A key's mutex
/// is dropped from the map when its last guard goes and nobody else waits.
pub(crate) struct KeyedLocks<K: Eq + Hash + Clone + Ord> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

/// Held lock on one key; unlocks and prunes on drop
pub(crate) struct KeyGuard<'a, K: Eq + Hash + Clone + Ord> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone + Ord> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(&self.key);
    }
}

impl<K: Eq + Hash + Clone + Ord> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        let lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Lock every key in ascending order, skipping duplicates
    pub async fn lock_all(&self, keys: &[&K]) -> Vec<KeyGuard<'_, K>> {
        let mut sorted: Vec<&K> = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys currently holding a mutex
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Drop the mutex for `key` if nobody holds or awaits it
    fn release(&self, key: &K) {
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_cancels_previous() {
        let table: TaskTable<&str> = TaskTable::new();
        let first = table.arm("u1");
        let second = table.arm("u1");

        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stale_finish_keeps_newer_slot() {
        let table: TaskTable<&str> = TaskTable::new();
        let first = table.arm("u1");
        let second = table.arm("u1");

        table.finish(&"u1", first.generation);
        assert!(table.is_armed(&"u1"));

        table.finish(&"u1", second.generation);
        assert!(!table.is_armed(&"u1"));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let table: TaskTable<&str> = TaskTable::new();
        let slot = table.arm("pair");
        assert!(table.cancel(&"pair"));
        assert!(slot.token.is_cancelled());
        assert!(!table.cancel(&"pair"));
    }

    #[tokio::test]
    async fn test_lock_all_dedups_and_releases() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        let a = "a".to_string();
        let b = "b".to_string();

        let guards = locks.lock_all(&[&b, &a, &b]).await;
        assert_eq!(guards.len(), 2);
        assert_eq!(locks.len(), 2);

        drop(guards);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_mutex_alive() {
        let locks: Arc<KeyedLocks<String>> = Arc::new(KeyedLocks::new());
        let key = "a".to_string();

        let first = locks.lock(&key).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&key).await;
            })
        };
        tokio::task::yield_now().await;

        // The waiter still references the mutex
        drop(first);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
