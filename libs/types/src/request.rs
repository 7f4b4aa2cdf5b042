//! Match request lifecycle types
//!
//! A request moves `Waiting → Pending → Matched` and is disposed afterwards.
//! A rejected or timed-out handshake sends the surviving side back to
//! `Waiting`.

use crate::criterion::Criterion;
use crate::ids::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Searching for a partner
    Waiting,
    /// Claimed into a pair, handshake in progress
    Pending,
    /// Both sides accepted, session being created (terminal)
    Matched,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Waiting => "waiting",
            RequestStatus::Pending => "pending",
            RequestStatus::Matched => "matched",
        };
        f.write_str(s)
    }
}

/// A user's outstanding match request
///
/// At most one exists per user; a resubmission overwrites the previous one.
/// `submitted_at_millis` is always the server's receipt time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub user_id: UserId,
    /// Distinct criteria in client insertion order (1 to 3 entries)
    pub criteria: Vec<Criterion>,
    pub submitted_at_millis: i64,
    pub status: RequestStatus,
}

impl MatchRequest {
    /// Create a new waiting request
    pub fn new(user_id: UserId, criteria: Vec<Criterion>, submitted_at_millis: i64) -> Self {
        Self {
            user_id,
            criteria,
            submitted_at_millis,
            status: RequestStatus::Waiting,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == RequestStatus::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::Difficulty;

    #[test]
    fn test_new_request_is_waiting() {
        let req = MatchRequest::new(
            UserId::new("u1"),
            vec![Criterion::new(Difficulty::Medium, "Rust", "Tree")],
            1_708_123_456_789,
        );
        assert!(req.is_waiting());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RequestStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }
}
