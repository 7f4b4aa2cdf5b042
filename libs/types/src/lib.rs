//! Types library for the peer-matchmaking coordinator
//!
//! This library provides the value types shared by the matchmaker core and
//! the gateway: identifiers, match criteria, request/pair/session records and
//! the error taxonomy.
//!
//! # Modules
//! - `ids`: Identifiers (UserId, SessionId, ConnectionId, PairKey)
//! - `criterion`: The (difficulty, language, topic) tuple users match on
//! - `request`: Pending match requests and their status
//! - `session`: Matched pairs and collaboration sessions
//! - `errors`: Error taxonomy

pub mod ids;
pub mod criterion;
pub mod request;
pub mod session;
pub mod errors;
