//! Session allocation
//!
//! The collaboration service owns session identifiers; the matchmaker only
//! asks it for one once a pair is confirmed. Retry and timeout policy belong
//! to the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use types::criterion::Criterion;
use types::errors::AllocatorError;
use types::ids::SessionId;

/// What the collaboration service hands back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedSession {
    pub session_id: SessionId,
    #[serde(default)]
    pub question_id: Option<String>,
}

#[async_trait]
pub trait SessionAllocator: Send + Sync {
    async fn create_session(&self, criteria: &Criterion) -> Result<AllocatedSession, AllocatorError>;
}

/// Mints session ids locally
///
/// Used when no collaboration service is configured and in tests.
#[derive(Debug, Default, Clone)]
pub struct LocalSessionAllocator;

#[async_trait]
impl SessionAllocator for LocalSessionAllocator {
    async fn create_session(&self, criteria: &Criterion) -> Result<AllocatedSession, AllocatorError> {
        let session_id = SessionId::generate();
        tracing::debug!(session = %session_id, criteria = %criteria, "allocated local session");
        Ok(AllocatedSession {
            session_id,
            question_id: None,
        })
    }
}
