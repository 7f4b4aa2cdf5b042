//! Change notifier
//!
//! Store backends publish a `ChangeEvent` whenever a record is created,
//! updated or deleted; interested parties subscribe by key. Delivery is
//! asynchronous: events go through a single dispatcher task, so callbacks for
//! one key observe events in publish order and never run while a store lock
//! is held.
//!
//! Delivery is at-least-once from the subscriber's point of view; callbacks
//! must be idempotent.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use types::ids::{PairKey, UserId};

/// Key namespaces used by the store backends
pub mod keys {
    use super::*;

    pub fn request(user: &UserId) -> String {
        format!("request:{}", user)
    }

    pub fn pair(user: &UserId) -> String {
        format!("pair:{}", user)
    }

    pub fn session(key: &PairKey) -> String {
        format!("session:{}", key)
    }
}

/// Kind of change applied to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Created,
    Updated,
    Deleted,
}

/// A single change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub key: String,
    pub operation: ChangeOperation,
    pub timestamp_millis: i64,
}

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

type SubscriberMap = DashMap<String, Vec<(SubscriptionId, ChangeCallback)>>;

/// In-process keyed pub/sub
pub struct ChangeNotifier {
    subscribers: Arc<SubscriberMap>,
    /// Reverse index: subscription -> key
    keys_by_id: DashMap<SubscriptionId, String>,
    next_id: AtomicU64,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChangeNotifier {
    /// Create a notifier and spawn its dispatcher task
    ///
    /// Must be called from within a tokio runtime. The dispatcher exits once
    /// the notifier is dropped.
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscribers: Arc<SubscriberMap> = Arc::new(DashMap::new());

        tokio::spawn(Self::dispatch(rx, Arc::clone(&subscribers)));

        Arc::new(Self {
            subscribers,
            keys_by_id: DashMap::new(),
            next_id: AtomicU64::new(1),
            tx,
        })
    }

    async fn dispatch(mut rx: mpsc::UnboundedReceiver<ChangeEvent>, subscribers: Arc<SubscriberMap>) {
        while let Some(event) = rx.recv().await {
            // Clone callbacks out so none runs under the map guard
            let callbacks: Vec<ChangeCallback> = subscribers
                .get(&event.key)
                .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default();

            for callback in callbacks {
                callback(event.clone());
            }
        }
        tracing::debug!("change notifier dispatcher stopped");
    }

    /// Register `callback` for changes to `key`
    pub fn subscribe(&self, key: impl Into<String>, callback: ChangeCallback) -> SubscriptionId {
        let key = key.into();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.subscribers
            .entry(key.clone())
            .or_default()
            .push((id, callback));
        self.keys_by_id.insert(id, key);

        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some((_, key)) = self.keys_by_id.remove(&id) else {
            return false;
        };

        let now_empty = match self.subscribers.get_mut(&key) {
            Some(mut subs) => {
                subs.retain(|(sub_id, _)| *sub_id != id);
                subs.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.subscribers.remove_if(&key, |_, subs| subs.is_empty());
        }

        true
    }

    /// Queue a change event for delivery
    pub fn publish(&self, key: impl Into<String>, operation: ChangeOperation) {
        let event = ChangeEvent {
            key: key.into(),
            operation,
            timestamp_millis: Utc::now().timestamp_millis(),
        };
        if self.tx.send(event).is_err() {
            tracing::warn!("change notifier dispatcher is gone, dropping event");
        }
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.subscribers.get(key).map(|subs| subs.len()).unwrap_or(0)
    }
}
