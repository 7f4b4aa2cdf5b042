//! Identifier types for matchmaking entities
//!
//! User ids are opaque strings issued by the identity provider. Session and
//! connection ids are minted locally as UUID v7 so they sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a user taking part in matchmaking
///
/// Ordering is lexical on the underlying string; it is used for the
/// deterministic tie-break between requests submitted in the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a collaboration session
///
/// Usually handed out by the collaboration service, so it is kept as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh time-sortable session id
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one live transport connection
///
/// A user that reconnects gets a new ConnectionId, which lets the transport
/// layer tell a stale socket's teardown apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical, order-independent key for two users
///
/// Format: the two user ids sorted lexically and joined with `:`. Any `:` or
/// `\` inside an id is backslash-escaped, so distinct pairs never share a
/// key even when ids contain the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairKey(String);

impl PairKey {
    pub fn new(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}:{}", escape(lo.as_str()), escape(hi.as_str())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape(id: &str) -> String {
    id.replace('\\', "\\\\").replace(':', "\\:")
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = UserId::new("alice");
        let b = UserId::new("bob");
        assert_eq!(PairKey::new(&a, &b), PairKey::new(&b, &a));
        assert_eq!(PairKey::new(&a, &b).as_str(), "alice:bob");
    }

    #[test]
    fn test_pair_key_separator_inside_ids() {
        let first = PairKey::new(&UserId::new("a:b"), &UserId::new("c"));
        let second = PairKey::new(&UserId::new("a"), &UserId::new("b:c"));
        assert_ne!(first, second);
        assert_eq!(first.as_str(), r"a\:b:c");
        assert_eq!(second.as_str(), r"a:b\:c");
    }

    #[test]
    fn test_user_id_ordering_is_lexical() {
        assert!(UserId::new("u10") < UserId::new("u2"));
        assert!(UserId::new("a") < UserId::new("b"));
    }

    #[test]
    fn test_session_id_generation() {
        let id1 = SessionId::generate();
        let id2 = SessionId::generate();
        assert_ne!(id1, id2, "SessionIds should be unique");
    }

    #[test]
    fn test_user_id_serialization() {
        let id = UserId::new("6642f0c1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"6642f0c1\"");

        let deserialized: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_connection_id_creation() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pair_key_ignores_argument_order(a in "[a-z0-9]{1,12}", b in "[a-z0-9]{1,12}") {
                let (a, b) = (UserId::new(a), UserId::new(b));
                prop_assert_eq!(PairKey::new(&a, &b), PairKey::new(&b, &a));
            }

            #[test]
            fn pair_key_is_injective(
                a in "[ab:\\\\]{0,6}",
                b in "[ab:\\\\]{0,6}",
                c in "[ab:\\\\]{0,6}",
                d in "[ab:\\\\]{0,6}",
            ) {
                let (a, b, c, d) = (UserId::new(a), UserId::new(b), UserId::new(c), UserId::new(d));
                let same_pair = (a == c && b == d) || (a == d && b == c);
                prop_assert_eq!(PairKey::new(&a, &b) == PairKey::new(&c, &d), same_pair);
            }
        }
    }
}
