//! Matching coordinator
//!
//! The state machine pairing waiting users and driving the acceptance
//! handshake. All shared state lives in the stores; this type only holds
//! process-local bookkeeping (search loops, timers, subscriptions, locks).
//!
//! ```text
//!  add_request ──▶ WAITING ──claim──▶ PENDING ──both accept──▶ MATCHED ──▶ disposed
//!                    ▲                   │
//!                    │  reject / timeout │
//!                    └───── (survivor) ◀─┘
//! ```
//!
//! Every step touching a user holds that user's lock (both users' locks, in
//! key order, for pair steps), so in-process steps on the same user never
//! interleave. Cross-instance safety comes from `atomic_transition`.

mod handshake;
mod search;
mod tasks;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use types::criterion::Criterion;
use types::errors::{StoreError, ValidationError};
use types::ids::{ConnectionId, PairKey, UserId};
use types::request::MatchRequest;
use types::session::MatchedPair;

use crate::allocator::SessionAllocator;
use crate::config::MatchmakerConfig;
use crate::criteria;
use crate::notifier::{keys, ChangeCallback, ChangeNotifier, ChangeOperation, SubscriptionId};
use crate::protocol::{AckResponse, ClientMessage, ServerMessage};
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::store::Stores;

use tasks::{KeyedLocks, TaskTable};

/// Coordinator errors surfaced to the transport layer
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Invalid match request: {0}")]
    Validation(#[from] ValidationError),

    #[error("No active match to respond to")]
    NoActiveMatch,

    /// Fatal: the coordinator cannot make progress
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => CoordinatorError::StoreUnavailable(msg),
            other => CoordinatorError::Store(other),
        }
    }
}

/// Snapshot of a user's stored matchmaking state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserState {
    pub request: Option<MatchRequest>,
    pub pair: Option<MatchedPair>,
}

/// Why a user left matchmaking; drives what the partner is told
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Departure {
    Cancelled,
    Rejected,
    Disconnected,
    Resubmitted,
}

impl Departure {
    fn partner_reason(&self) -> &'static str {
        match self {
            Departure::Rejected => "partner rejected the match",
            Departure::Disconnected => "partner disconnected",
            Departure::Cancelled | Departure::Resubmitted => "partner cancelled the request",
        }
    }
}

pub(crate) struct Inner {
    stores: Stores,
    registry: Arc<ConnectionRegistry>,
    notifier: Arc<ChangeNotifier>,
    config: MatchmakerConfig,
    searches: TaskTable<UserId>,
    timers: TaskTable<PairKey>,
    locks: KeyedLocks<UserId>,
    subscriptions: DashMap<UserId, SubscriptionId>,
    session_attempts: DashMap<PairKey, u32>,
    healthy: AtomicBool,
}

/// Cheap-to-clone handle to the coordinator
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(
        stores: Stores,
        registry: Arc<ConnectionRegistry>,
        notifier: Arc<ChangeNotifier>,
        config: MatchmakerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                stores,
                registry,
                notifier,
                config,
                searches: TaskTable::new(),
                timers: TaskTable::new(),
                locks: KeyedLocks::new(),
                subscriptions: DashMap::new(),
                session_attempts: DashMap::new(),
                healthy: AtomicBool::new(true),
            }),
        }
    }

    /// Single-instance coordinator over the in-memory backends
    ///
    /// Must be called from within a tokio runtime.
    pub fn in_memory(config: MatchmakerConfig, allocator: Arc<dyn SessionAllocator>) -> Self {
        let notifier = ChangeNotifier::new();
        let stores = Stores::in_memory(Arc::clone(&notifier), allocator);
        Self::new(stores, Arc::new(ConnectionRegistry::new()), notifier, config)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.registry
    }

    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    pub fn config(&self) -> &MatchmakerConfig {
        &self.inner.config
    }

    /// False once a store reported itself unavailable
    pub fn is_healthy(&self) -> bool {
        self.inner.healthy.load(Ordering::SeqCst)
    }

    pub fn active_searches(&self) -> usize {
        self.inner.searches.len()
    }

    pub fn active_timers(&self) -> usize {
        self.inner.timers.len()
    }

    /// Users with a live coordinator lock entry
    pub fn active_locks(&self) -> usize {
        self.inner.locks.len()
    }

    // ── Transport entry points ──────────────────────────────────────

    /// Attach a live connection and re-send any pending match proposal
    pub async fn connect(&self, user: UserId, handle: ConnectionHandle) -> Result<(), CoordinatorError> {
        if let Some(previous) = self.inner.registry.register(user.clone(), handle) {
            previous.close("replaced by a newer connection");
        }
        tracing::info!(user = %user, "connection registered");

        let result = self.resync(&user).await;
        self.observe(result)
    }

    /// Tear down after the connection `connection` closed
    ///
    /// A socket that was already replaced or closed by the coordinator is
    /// ignored. Otherwise identical to a cancel (a reject while pending).
    pub async fn disconnect(&self, user: &UserId, connection: ConnectionId) -> Result<(), CoordinatorError> {
        if !self.inner.registry.unregister(user, connection) {
            tracing::debug!(user = %user, connection = %connection, "stale connection closed");
            return Ok(());
        }
        tracing::info!(user = %user, "connection closed");

        let result = self.withdraw(user, Departure::Disconnected).await;
        self.observe(result)
    }

    /// Dispatch one inbound message
    pub async fn handle_message(&self, user: &UserId, msg: ClientMessage) -> Result<(), CoordinatorError> {
        match msg {
            ClientMessage::MatchRequest { criterias } => self.add_request(user, criterias).await,
            ClientMessage::MatchAck {
                response: AckResponse::Accept,
            } => self.accept(user).await,
            ClientMessage::MatchAck {
                response: AckResponse::Reject,
            } => self.reject(user).await,
            ClientMessage::MatchCancel => self.cancel(user).await,
        }
    }

    /// Submit (or resubmit) a match request
    ///
    /// The submission time is stamped here. An existing request for the user
    /// is withdrawn first, so a resubmission overwrites rather than appends.
    pub async fn add_request(&self, user: &UserId, criteria: Vec<Criterion>) -> Result<(), CoordinatorError> {
        let result = self.add_request_inner(user, criteria).await;
        self.observe(result)
    }

    async fn add_request_inner(&self, user: &UserId, criteria: Vec<Criterion>) -> Result<(), CoordinatorError> {
        let criteria = criteria::normalize(criteria)?;

        self.withdraw(user, Departure::Resubmitted).await?;

        // Watch before the request is visible: another user's search may claim
        // it before this call returns
        self.watch_pair(user);
        {
            let _guard = self.inner.locks.lock(user).await;
            let request = MatchRequest::new(user.clone(), criteria, Utc::now().timestamp_millis());
            if let Err(e) = self.inner.stores.requests.put(request).await {
                self.unwatch_pair(user);
                return Err(e.into());
            }
        }
        tracing::info!(user = %user, "match request queued");

        self.inner.registry.send(user, ServerMessage::RequestQueued);
        self.spawn_search(user.clone());
        Ok(())
    }

    /// Leave matchmaking; while pending this is an implicit reject
    pub async fn cancel(&self, user: &UserId) -> Result<(), CoordinatorError> {
        let result = self.withdraw(user, Departure::Cancelled).await;
        self.observe(result)
    }

    pub async fn accept(&self, user: &UserId) -> Result<(), CoordinatorError> {
        let result = self.accept_inner(user).await;
        self.observe(result)
    }

    pub async fn reject(&self, user: &UserId) -> Result<(), CoordinatorError> {
        let result = self.reject_inner(user).await;
        self.observe(result)
    }

    /// Stored request and pair for `user`
    pub async fn state_of(&self, user: &UserId) -> Result<UserState, CoordinatorError> {
        let result = self.state_of_inner(user).await;
        self.observe(result)
    }

    async fn state_of_inner(&self, user: &UserId) -> Result<UserState, CoordinatorError> {
        Ok(UserState {
            request: self.inner.stores.requests.get(user).await?,
            pair: self.inner.stores.pairs.get(user).await?,
        })
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Flip to unhealthy on a fatal store error
    fn observe<T>(&self, result: Result<T, CoordinatorError>) -> Result<T, CoordinatorError> {
        if let Err(e) = &result {
            self.note_failure(e);
        }
        result
    }

    fn note_failure(&self, err: &CoordinatorError) {
        if let CoordinatorError::StoreUnavailable(msg) = err {
            if self.inner.healthy.swap(false, Ordering::SeqCst) {
                tracing::error!(error = %msg, "store unavailable, coordinator can no longer make progress");
            }
        }
    }

    /// Run a store operation, retrying bounded times on contention
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max = self.inner.config.max_transition_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f().await {
                Err(e) if e.is_transient() && attempt < max => {
                    tracing::debug!(op, attempt, error = %e, "transient store error, retrying");
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                result => return result,
            }
        }
    }

    async fn resync(&self, user: &UserId) -> Result<(), CoordinatorError> {
        if let Some(pair) = self.inner.stores.pairs.get(user).await? {
            tracing::debug!(user = %user, partner = %pair.partner, "re-sending pending match");
            self.inner
                .registry
                .send(user, ServerMessage::MatchFound { criteria: pair.criteria });
        }
        Ok(())
    }

    /// Push `matchFound` whenever a pair record is created for `user`
    fn watch_pair(&self, user: &UserId) {
        let inner = Arc::downgrade(&self.inner);
        let notifier = Arc::clone(&self.inner.notifier);

        self.inner.subscriptions.entry(user.clone()).or_insert_with(|| {
            let watched = user.clone();
            let callback: ChangeCallback = Arc::new(move |event| {
                if event.operation != ChangeOperation::Created {
                    return;
                }
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                let coordinator = Coordinator { inner };
                let user = watched.clone();
                tokio::spawn(async move {
                    if let Err(e) = coordinator.push_match_found(&user).await {
                        tracing::warn!(user = %user, error = %e, "failed to push match notification");
                    }
                });
            });
            notifier.subscribe(keys::pair(user), callback)
        });
    }

    fn unwatch_pair(&self, user: &UserId) {
        if let Some((_, id)) = self.inner.subscriptions.remove(user) {
            self.inner.notifier.unsubscribe(id);
        }
    }

    async fn push_match_found(&self, user: &UserId) -> Result<(), CoordinatorError> {
        if let Some(pair) = self.inner.stores.pairs.get(user).await? {
            tracing::info!(user = %user, partner = %pair.partner, criteria = %pair.criteria, "match found");
            self.inner
                .registry
                .send(user, ServerMessage::MatchFound { criteria: pair.criteria });
        }
        Ok(())
    }
}
