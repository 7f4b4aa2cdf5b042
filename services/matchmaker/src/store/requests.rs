//! In-memory request store
//!
//! All requests and the compatibility index live behind one async mutex, so
//! `atomic_transition` is trivially linearizable and the index never drifts
//! from the records it describes.
//!
//! # Index layout
//! ```text
//! Criterion ──▶ BTreeSet<(submitted_at_millis, UserId)>   (waiting only)
//! ```
//! `find_oldest_compatible` looks at the head of each of the caller's
//! criteria (at most 3 sets) instead of scanning every request.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use types::criterion::Criterion;
use types::errors::StoreError;
use types::ids::UserId;
use types::request::{MatchRequest, RequestStatus};

use super::RequestStore;
use crate::notifier::{keys, ChangeNotifier, ChangeOperation};

type QueueEntry = (i64, UserId);

#[derive(Default)]
struct Inner {
    requests: HashMap<UserId, MatchRequest>,
    waiting_index: HashMap<Criterion, BTreeSet<QueueEntry>>,
}

impl Inner {
    fn index(&mut self, request: &MatchRequest) {
        if !request.is_waiting() {
            return;
        }
        for c in &request.criteria {
            self.waiting_index
                .entry(c.clone())
                .or_default()
                .insert((request.submitted_at_millis, request.user_id.clone()));
        }
    }

    fn unindex(&mut self, request: &MatchRequest) {
        let entry = (request.submitted_at_millis, request.user_id.clone());
        for c in &request.criteria {
            if let Some(queue) = self.waiting_index.get_mut(c) {
                queue.remove(&entry);
                if queue.is_empty() {
                    self.waiting_index.remove(c);
                }
            }
        }
    }

    /// Change status keeping the index in step
    fn set_status(&mut self, user: &UserId, status: RequestStatus) -> bool {
        let Some(mut request) = self.requests.remove(user) else {
            return false;
        };
        self.unindex(&request);
        request.status = status;
        self.index(&request);
        self.requests.insert(user.clone(), request);
        true
    }
}

pub struct InMemoryRequestStore {
    inner: Mutex<Inner>,
    notifier: Arc<ChangeNotifier>,
}

impl InMemoryRequestStore {
    pub fn new(notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notifier,
        }
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn put(&self, request: MatchRequest) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let key = keys::request(&request.user_id);

        let operation = match inner.requests.remove(&request.user_id) {
            Some(previous) => {
                inner.unindex(&previous);
                ChangeOperation::Updated
            }
            None => ChangeOperation::Created,
        };
        inner.index(&request);
        inner.requests.insert(request.user_id.clone(), request);

        self.notifier.publish(key, operation);
        Ok(())
    }

    async fn get(&self, user: &UserId) -> Result<Option<MatchRequest>, StoreError> {
        Ok(self.inner.lock().await.requests.get(user).cloned())
    }

    async fn remove(&self, user: &UserId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.requests.remove(user) {
            Some(request) => {
                inner.unindex(&request);
                self.notifier.publish(keys::request(user), ChangeOperation::Deleted);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_oldest_compatible(
        &self,
        user: &UserId,
        criteria: &[Criterion],
    ) -> Result<Option<MatchRequest>, StoreError> {
        let inner = self.inner.lock().await;

        let oldest: Option<&QueueEntry> = criteria
            .iter()
            .filter_map(|c| inner.waiting_index.get(c))
            .filter_map(|queue| queue.iter().find(|(_, candidate)| candidate != user))
            .min();

        Ok(oldest.and_then(|(_, candidate)| inner.requests.get(candidate).cloned()))
    }

    async fn atomic_transition(
        &self,
        a: &UserId,
        b: &UserId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<bool, StoreError> {
        if a == b {
            return Ok(false);
        }

        let mut inner = self.inner.lock().await;
        let both_in_state = [a, b].iter().all(|user| {
            inner
                .requests
                .get(*user)
                .is_some_and(|request| request.status == from)
        });
        if !both_in_state {
            return Ok(false);
        }

        inner.set_status(a, to);
        inner.set_status(b, to);

        self.notifier.publish(keys::request(a), ChangeOperation::Updated);
        self.notifier.publish(keys::request(b), ChangeOperation::Updated);
        Ok(true)
    }

    async fn set_status(&self, user: &UserId, status: RequestStatus) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let updated = inner.set_status(user, status);
        if updated {
            self.notifier.publish(keys::request(user), ChangeOperation::Updated);
        }
        Ok(updated)
    }

    async fn waiting_count(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.requests.values().filter(|r| r.is_waiting()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::criterion::Difficulty;

    fn easy_js_array() -> Criterion {
        Criterion::new(Difficulty::Easy, "JS", "Array")
    }

    fn request(user: &str, criteria: Vec<Criterion>, ts: i64) -> MatchRequest {
        MatchRequest::new(UserId::new(user), criteria, ts)
    }

    fn store() -> InMemoryRequestStore {
        InMemoryRequestStore::new(ChangeNotifier::new())
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_request() {
        let store = store();
        store.put(request("u1", vec![easy_js_array()], 10)).await.unwrap();
        let graph = Criterion::new(Difficulty::Hard, "Go", "Graph");
        store.put(request("u1", vec![graph.clone()], 20)).await.unwrap();

        let stored = store.get(&UserId::new("u1")).await.unwrap().unwrap();
        assert_eq!(stored.criteria, vec![graph]);
        assert_eq!(store.waiting_count().await.unwrap(), 1);

        // Old criterion no longer indexed
        let found = store
            .find_oldest_compatible(&UserId::new("u2"), &[easy_js_array()])
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_oldest_excludes_self_and_orders_by_time() {
        let store = store();
        store.put(request("u1", vec![easy_js_array()], 30)).await.unwrap();
        store.put(request("u2", vec![easy_js_array()], 10)).await.unwrap();
        store.put(request("u3", vec![easy_js_array()], 20)).await.unwrap();

        let found = store
            .find_oldest_compatible(&UserId::new("u2"), &[easy_js_array()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, UserId::new("u3"));
    }

    #[tokio::test]
    async fn test_find_oldest_tie_breaks_on_user_id() {
        let store = store();
        store.put(request("zoe", vec![easy_js_array()], 10)).await.unwrap();
        store.put(request("amy", vec![easy_js_array()], 10)).await.unwrap();

        let found = store
            .find_oldest_compatible(&UserId::new("me"), &[easy_js_array()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, UserId::new("amy"));
    }

    #[tokio::test]
    async fn test_find_oldest_unions_across_criteria() {
        let store = store();
        let graph = Criterion::new(Difficulty::Hard, "Go", "Graph");
        store.put(request("u1", vec![easy_js_array()], 50)).await.unwrap();
        store.put(request("u2", vec![graph.clone()], 40)).await.unwrap();

        let found = store
            .find_oldest_compatible(&UserId::new("me"), &[easy_js_array(), graph])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, UserId::new("u2"));
    }

    #[tokio::test]
    async fn test_find_oldest_skips_non_waiting() {
        let store = store();
        store.put(request("u1", vec![easy_js_array()], 10)).await.unwrap();
        store.put(request("u2", vec![easy_js_array()], 20)).await.unwrap();
        store.put(request("u3", vec![easy_js_array()], 30)).await.unwrap();
        assert!(store
            .atomic_transition(
                &UserId::new("u1"),
                &UserId::new("u2"),
                RequestStatus::Waiting,
                RequestStatus::Pending
            )
            .await
            .unwrap());

        let found = store
            .find_oldest_compatible(&UserId::new("me"), &[easy_js_array()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, UserId::new("u3"));
    }

    #[tokio::test]
    async fn test_transition_requires_both_in_from_state() {
        let store = store();
        store.put(request("u1", vec![easy_js_array()], 10)).await.unwrap();
        store.put(request("u2", vec![easy_js_array()], 20)).await.unwrap();
        store.set_status(&UserId::new("u2"), RequestStatus::Pending).await.unwrap();

        let ok = store
            .atomic_transition(
                &UserId::new("u1"),
                &UserId::new("u2"),
                RequestStatus::Waiting,
                RequestStatus::Pending,
            )
            .await
            .unwrap();
        assert!(!ok);

        // Neither side modified
        let u1 = store.get(&UserId::new("u1")).await.unwrap().unwrap();
        let u2 = store.get(&UserId::new("u2")).await.unwrap().unwrap();
        assert_eq!(u1.status, RequestStatus::Waiting);
        assert_eq!(u2.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_transition_rejects_self_pair_and_missing_user() {
        let store = store();
        store.put(request("u1", vec![easy_js_array()], 10)).await.unwrap();
        let u1 = UserId::new("u1");

        assert!(!store
            .atomic_transition(&u1, &u1, RequestStatus::Waiting, RequestStatus::Pending)
            .await
            .unwrap());
        assert!(!store
            .atomic_transition(&u1, &UserId::new("ghost"), RequestStatus::Waiting, RequestStatus::Pending)
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_contested_transitions_are_all_or_nothing() {
        let store = Arc::new(store());
        for i in 0..3 {
            store
                .put(request(&format!("u{}", i), vec![easy_js_array()], i))
                .await
                .unwrap();
        }

        // u0-u1, u1-u2 and u0-u2 all race for the same users
        let pairs = [("u0", "u1"), ("u1", "u2"), ("u0", "u2")];
        let mut handles = Vec::new();
        for (a, b) in pairs {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let ok = store
                    .atomic_transition(
                        &UserId::new(a),
                        &UserId::new(b),
                        RequestStatus::Waiting,
                        RequestStatus::Pending,
                    )
                    .await
                    .unwrap();
                (a, b, ok)
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            let (a, b, ok) = handle.await.unwrap();
            if ok {
                winners.push((a, b));
            }
        }
        assert_eq!(winners.len(), 1, "exactly one overlapping pair may win");

        let (a, b) = winners[0];
        let mut pending = 0;
        for i in 0..3 {
            let user = format!("u{}", i);
            let status = store.get(&UserId::new(&user)).await.unwrap().unwrap().status;
            if status == RequestStatus::Pending {
                pending += 1;
                assert!(user == a || user == b);
            }
        }
        assert_eq!(pending, 2);
    }
}
