//! Store abstractions
//!
//! The coordinator owns every lifecycle transition; stores only persist
//! records and expose the atomic primitives the transitions are built on.
//! Backends are swappable behind these traits: the in-memory backends serve
//! a single instance and the tests, a shared external backend serves a
//! horizontally scaled deployment.

use async_trait::async_trait;
use std::sync::Arc;
use types::criterion::Criterion;
use types::errors::StoreError;
use types::ids::UserId;
use types::request::{MatchRequest, RequestStatus};
use types::session::{CollaborationSession, MatchedPair};

use crate::allocator::SessionAllocator;
use crate::notifier::ChangeNotifier;

pub mod pairs;
pub mod requests;
pub mod sessions;

pub use pairs::InMemoryPairStore;
pub use requests::InMemoryRequestStore;
pub use sessions::InMemorySessionStore;

/// Pending match requests, one per user
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Upsert, overwriting any prior request for the same user
    async fn put(&self, request: MatchRequest) -> Result<(), StoreError>;

    async fn get(&self, user: &UserId) -> Result<Option<MatchRequest>, StoreError>;

    /// Returns true if a request was removed
    async fn remove(&self, user: &UserId) -> Result<bool, StoreError>;

    /// Oldest waiting request other than `user`'s sharing a criterion
    ///
    /// Ordered by `submitted_at_millis`, ties broken by user id.
    async fn find_oldest_compatible(
        &self,
        user: &UserId,
        criteria: &[Criterion],
    ) -> Result<Option<MatchRequest>, StoreError>;

    /// Move both requests from `from` to `to` as one unit
    ///
    /// Returns false, modifying nothing, unless both currently have status
    /// `from`. Concurrent callers on overlapping pairs are linearized.
    async fn atomic_transition(
        &self,
        a: &UserId,
        b: &UserId,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<bool, StoreError>;

    /// Single-key status update. Returns false if the user has no request.
    async fn set_status(&self, user: &UserId, status: RequestStatus) -> Result<bool, StoreError>;

    async fn waiting_count(&self) -> Result<usize, StoreError>;
}

/// Per-user matched pair records
#[async_trait]
pub trait PairStore: Send + Sync {
    async fn store(&self, user: &UserId, partner: &UserId, criteria: &Criterion) -> Result<(), StoreError>;

    async fn get(&self, user: &UserId) -> Result<Option<MatchedPair>, StoreError>;

    async fn remove(&self, user: &UserId) -> Result<bool, StoreError>;

    /// Mark `user`'s side as accepted, returning the updated record
    async fn update_acceptance(&self, user: &UserId) -> Result<Option<MatchedPair>, StoreError>;
}

/// Collaboration sessions keyed by canonical pair key
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocate and store a session, or return the one already stored
    async fn create(
        &self,
        a: &UserId,
        b: &UserId,
        criteria: &Criterion,
    ) -> Result<CollaborationSession, StoreError>;

    async fn get(&self, a: &UserId, b: &UserId) -> Result<Option<CollaborationSession>, StoreError>;

    async fn delete(&self, a: &UserId, b: &UserId) -> Result<bool, StoreError>;
}

/// The three stores the coordinator works against
#[derive(Clone)]
pub struct Stores {
    pub requests: Arc<dyn RequestStore>,
    pub pairs: Arc<dyn PairStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Stores {
    /// In-process backends publishing to `notifier`
    pub fn in_memory(notifier: Arc<ChangeNotifier>, allocator: Arc<dyn SessionAllocator>) -> Self {
        Self {
            requests: Arc::new(InMemoryRequestStore::new(Arc::clone(&notifier))),
            pairs: Arc::new(InMemoryPairStore::new(Arc::clone(&notifier))),
            sessions: Arc::new(InMemorySessionStore::new(allocator, notifier)),
        }
    }
}
