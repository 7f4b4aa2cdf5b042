//! Error types for the matchmaking coordinator
//!
//! Error taxonomy using thiserror

use thiserror::Error;

/// Rejected match request input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("At least one criterion is required")]
    EmptyCriteria,

    #[error("Too many criteria: {count} (max {max})")]
    TooManyCriteria { count: usize, max: usize },

    #[error("Criterion field must not be blank: {field}")]
    BlankField { field: &'static str },
}

/// Session allocator (collaboration service) errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocatorError {
    #[error("Collaboration service unreachable: {0}")]
    Unreachable(String),

    #[error("Collaboration service rejected request: {0}")]
    Rejected(String),
}

/// Store backend errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Optimistic-lock conflict; the caller may retry
    #[error("Write contention on {key}")]
    Contention { key: String },

    /// Backend cannot be reached; no progress is possible
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Session allocation failed: {0}")]
    Allocator(#[from] AllocatorError),

    #[error("Store inconsistency: {0}")]
    Inconsistent(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Contention { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::TooManyCriteria { count: 4, max: 3 };
        assert_eq!(err.to_string(), "Too many criteria: 4 (max 3)");
    }

    #[test]
    fn test_store_error_from_allocator_error() {
        let err: StoreError = AllocatorError::Unreachable("connection refused".into()).into();
        assert!(matches!(err, StoreError::Allocator(_)));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_only_contention_is_transient() {
        assert!(StoreError::Contention { key: "request:u1".into() }.is_transient());
        assert!(!StoreError::Unavailable("down".into()).is_transient());
    }
}
