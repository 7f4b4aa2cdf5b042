//! Matched pairs and collaboration sessions

use crate::criterion::Criterion;
use crate::ids::{PairKey, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// One side of a proposed match
///
/// Stored per user; both participants hold a record pointing at each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPair {
    pub partner: UserId,
    /// The criterion both sides agreed on
    pub criteria: Criterion,
    pub accepted: bool,
}

impl MatchedPair {
    pub fn new(partner: UserId, criteria: Criterion) -> Self {
        Self {
            partner,
            criteria,
            accepted: false,
        }
    }
}

/// A collaboration session created for a confirmed pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationSession {
    pub session_id: SessionId,
    /// Stored in canonical (sorted) order
    pub user_ids: (UserId, UserId),
    pub criteria: Criterion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
}

impl CollaborationSession {
    pub fn new(
        session_id: SessionId,
        a: UserId,
        b: UserId,
        criteria: Criterion,
        question_id: Option<String>,
    ) -> Self {
        let user_ids = if a <= b { (a, b) } else { (b, a) };
        Self {
            session_id,
            user_ids,
            criteria,
            question_id,
        }
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.user_ids.0, &self.user_ids.1)
    }
}
