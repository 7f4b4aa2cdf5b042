//! Shared harness for the coordinator integration suites

#![allow(dead_code)]

use matchmaker::protocol::ServerMessage;
use matchmaker::{ConnectionHandle, Coordinator, MatchmakerConfig, Outbound};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use types::criterion::{Criterion, Difficulty};
use types::ids::UserId;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// Short timings so the suites finish quickly
pub fn fast_config() -> MatchmakerConfig {
    MatchmakerConfig {
        acceptance_timeout: Duration::from_millis(300),
        search_interval: Duration::from_millis(20),
        max_transition_attempts: 5,
        session_retry_delay: Duration::from_millis(50),
        max_session_attempts: 3,
    }
}

pub fn easy_js_array() -> Criterion {
    Criterion::new(Difficulty::Easy, "JS", "Array")
}

pub fn hard_go_graph() -> Criterion {
    Criterion::new(Difficulty::Hard, "Go", "Graph")
}

pub fn medium_rust_tree() -> Criterion {
    Criterion::new(Difficulty::Medium, "Rust", "Tree")
}

/// A connected test client
pub struct Client {
    pub user: UserId,
    pub handle: ConnectionHandle,
    pub rx: UnboundedReceiver<Outbound>,
}

impl Client {
    pub async fn connect(coordinator: &Coordinator, name: &str) -> Self {
        let user = UserId::new(name);
        let (handle, rx) = ConnectionHandle::channel();
        coordinator.connect(user.clone(), handle.clone()).await.unwrap();
        Self { user, handle, rx }
    }

    /// Submit and consume the `requestQueued` acknowledgement
    pub async fn submit(&mut self, coordinator: &Coordinator, criteria: Vec<Criterion>) {
        coordinator.add_request(&self.user, criteria).await.unwrap();
        assert_eq!(self.next_message().await, ServerMessage::RequestQueued);
    }

    pub async fn next_outbound(&mut self) -> Outbound {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .unwrap_or_else(|_| panic!("{} received nothing in time", self.user))
            .expect("connection channel closed")
    }

    pub async fn next_message(&mut self) -> ServerMessage {
        match self.next_outbound().await {
            Outbound::Message(msg) => msg,
            other => panic!("{} expected a message, got {:?}", self.user, other),
        }
    }

    pub async fn expect_match_found(&mut self) -> Criterion {
        match self.next_message().await {
            ServerMessage::MatchFound { criteria } => criteria,
            other => panic!("{} expected matchFound, got {:?}", self.user, other),
        }
    }

    /// Nothing queued within `window`
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(window, self.rx.recv()).await {
            panic!("{} expected no traffic, got {:?}", self.user, frame);
        }
    }

    /// Everything currently queued, without waiting
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Poll `check` until it holds or the deadline passes
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {}", what);
}
