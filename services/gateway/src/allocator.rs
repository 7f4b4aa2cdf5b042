//! Session allocation over HTTP
//!
//! Asks the collaboration service for a session once a pair is confirmed.
//! The request carries a fresh `x-request-id` so the two sides' logs can be
//! correlated.

use anyhow::{Context, Result};
use async_trait::async_trait;
use matchmaker::SessionAllocator;
use matchmaker::allocator::AllocatedSession;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use types::criterion::Criterion;
use types::errors::AllocatorError;
use uuid::Uuid;

pub struct HttpSessionAllocator {
    http_client: Client,
    sessions_url: String,
}

impl HttpSessionAllocator {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build session service client")?;

        Ok(Self {
            http_client,
            sessions_url: format!("{}/sessions", service_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SessionAllocator for HttpSessionAllocator {
    async fn create_session(&self, criteria: &Criterion) -> Result<AllocatedSession, AllocatorError> {
        let request_id = Uuid::now_v7();

        let response = self
            .http_client
            .post(&self.sessions_url)
            .header("x-request-id", request_id.to_string())
            .json(&json!({ "criteria": criteria }))
            .send()
            .await
            .map_err(|e| AllocatorError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%request_id, %status, "session service refused allocation");
            return Err(AllocatorError::Rejected(format!("session service returned {}", status)));
        }

        let session: AllocatedSession = response
            .json()
            .await
            .map_err(|e| AllocatorError::Rejected(format!("malformed session response: {}", e)))?;

        tracing::debug!(%request_id, session = %session.session_id, "session allocated");
        Ok(session)
    }
}
