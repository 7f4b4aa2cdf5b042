//! In-memory session store
//!
//! Sessions are keyed by the canonical pair key. Creation holds a per-key
//! lock across the allocator call so a pair can never end up with two
//! allocated sessions, even if two resolvers race.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use types::criterion::Criterion;
use types::errors::StoreError;
use types::ids::{PairKey, UserId};
use types::session::CollaborationSession;

use super::SessionStore;
use crate::allocator::SessionAllocator;
use crate::notifier::{keys, ChangeNotifier, ChangeOperation};

pub struct InMemorySessionStore {
    sessions: DashMap<PairKey, CollaborationSession>,
    creating: DashMap<PairKey, Arc<Mutex<()>>>,
    allocator: Arc<dyn SessionAllocator>,
    notifier: Arc<ChangeNotifier>,
}

impl InMemorySessionStore {
    pub fn new(allocator: Arc<dyn SessionAllocator>, notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            sessions: DashMap::new(),
            creating: DashMap::new(),
            allocator,
            notifier,
        }
    }

    async fn create_locked(
        &self,
        key: &PairKey,
        a: &UserId,
        b: &UserId,
        criteria: &Criterion,
    ) -> Result<CollaborationSession, StoreError> {
        if let Some(existing) = self.sessions.get(key) {
            return Ok(existing.clone());
        }

        let allocated = self.allocator.create_session(criteria).await?;
        let session = CollaborationSession::new(
            allocated.session_id,
            a.clone(),
            b.clone(),
            criteria.clone(),
            allocated.question_id,
        );
        self.sessions.insert(session.pair_key(), session.clone());
        self.notifier.publish(keys::session(key), ChangeOperation::Created);

        tracing::info!(pair = %key, session = %session.session_id, "collaboration session stored");
        Ok(session)
    }

    /// Pairs with a creation in flight
    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.creating.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(
        &self,
        a: &UserId,
        b: &UserId,
        criteria: &Criterion,
    ) -> Result<CollaborationSession, StoreError> {
        let key = PairKey::new(a, b);
        let lock = Arc::clone(self.creating.entry(key.clone()).or_default().value());

        let result = {
            let _guard = lock.lock().await;
            self.create_locked(&key, a, b, criteria).await
        };

        // Last one out drops the creation mutex, on failure too
        drop(lock);
        self.creating.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn get(&self, a: &UserId, b: &UserId) -> Result<Option<CollaborationSession>, StoreError> {
        Ok(self.sessions.get(&PairKey::new(a, b)).map(|s| s.clone()))
    }

    async fn delete(&self, a: &UserId, b: &UserId) -> Result<bool, StoreError> {
        let key = PairKey::new(a, b);
        self.creating.remove(&key);
        let removed = self.sessions.remove(&key).is_some();
        if removed {
            self.notifier.publish(keys::session(&key), ChangeOperation::Deleted);
        }
        Ok(removed)
    }
}
