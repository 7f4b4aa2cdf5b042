//! In-memory matched-pair store

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use types::criterion::Criterion;
use types::errors::StoreError;
use types::ids::UserId;
use types::session::MatchedPair;

use super::PairStore;
use crate::notifier::{keys, ChangeNotifier, ChangeOperation};

pub struct InMemoryPairStore {
    pairs: DashMap<UserId, MatchedPair>,
    notifier: Arc<ChangeNotifier>,
}

impl InMemoryPairStore {
    pub fn new(notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            pairs: DashMap::new(),
            notifier,
        }
    }
}

#[async_trait]
impl PairStore for InMemoryPairStore {
    async fn store(&self, user: &UserId, partner: &UserId, criteria: &Criterion) -> Result<(), StoreError> {
        let previous = self
            .pairs
            .insert(user.clone(), MatchedPair::new(partner.clone(), criteria.clone()));

        let operation = if previous.is_some() {
            ChangeOperation::Updated
        } else {
            ChangeOperation::Created
        };
        self.notifier.publish(keys::pair(user), operation);
        Ok(())
    }

    async fn get(&self, user: &UserId) -> Result<Option<MatchedPair>, StoreError> {
        Ok(self.pairs.get(user).map(|p| p.clone()))
    }

    async fn remove(&self, user: &UserId) -> Result<bool, StoreError> {
        let removed = self.pairs.remove(user).is_some();
        if removed {
            self.notifier.publish(keys::pair(user), ChangeOperation::Deleted);
        }
        Ok(removed)
    }

    async fn update_acceptance(&self, user: &UserId) -> Result<Option<MatchedPair>, StoreError> {
        let updated = self.pairs.get_mut(user).map(|mut pair| {
            pair.accepted = true;
            pair.clone()
        });
        if updated.is_some() {
            self.notifier.publish(keys::pair(user), ChangeOperation::Updated);
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::criterion::Difficulty;

    #[tokio::test]
    async fn test_update_acceptance() {
        let store = InMemoryPairStore::new(ChangeNotifier::new());
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");
        let criteria = Criterion::new(Difficulty::Easy, "JS", "Array");

        store.store(&u1, &u2, &criteria).await.unwrap();
        let updated = store.update_acceptance(&u1).await.unwrap().unwrap();
        assert!(updated.accepted);
        assert_eq!(updated.partner, u2);
        assert!(store.get(&u1).await.unwrap().unwrap().accepted);
    }

    #[tokio::test]
    async fn test_missing_record() {
        let store = InMemoryPairStore::new(ChangeNotifier::new());
        let ghost = UserId::new("ghost");
        assert!(store.update_acceptance(&ghost).await.unwrap().is_none());
        assert!(!store.remove(&ghost).await.unwrap());
    }
}
