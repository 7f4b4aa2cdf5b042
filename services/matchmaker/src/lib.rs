//! Matchmaker Service
//!
//! Pairs waiting users sharing a compatible criterion (difficulty, language,
//! topic), runs the time-boxed mutual acceptance handshake and hands the
//! confirmed pair off to collaboration-session creation.
//!
//! **Key Invariants:**
//! - A user is in at most one pair at a time
//! - Claims are atomic over both requests (no double-match)
//! - Exactly one session per confirmed pair
//! - Oldest compatible request first, ties by user id

pub mod allocator;
pub mod config;
pub mod coordinator;
pub mod criteria;
pub mod notifier;
pub mod protocol;
pub mod registry;
pub mod store;

pub use allocator::{LocalSessionAllocator, SessionAllocator};
pub use config::MatchmakerConfig;
pub use coordinator::{Coordinator, CoordinatorError, UserState};
pub use registry::{ConnectionHandle, ConnectionRegistry, Outbound};
