//! Coordinator tuning

use std::time::Duration;

/// Configuration for the matching coordinator
#[derive(Debug, Clone)]
pub struct MatchmakerConfig {
    /// How long both sides have to accept a proposed match
    pub acceptance_timeout: Duration,
    /// Delay between search attempts for a waiting user
    pub search_interval: Duration,
    /// Attempts per store operation on optimistic-lock contention
    pub max_transition_attempts: u32,
    /// Delay before retrying session creation after an allocator failure
    pub session_retry_delay: Duration,
    /// Failed session creation rounds before the pair is dissolved
    pub max_session_attempts: u32,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            acceptance_timeout: Duration::from_secs(15),
            search_interval: Duration::from_millis(500),
            max_transition_attempts: 5,
            session_retry_delay: Duration::from_secs(1),
            max_session_attempts: 3,
        }
    }
}
