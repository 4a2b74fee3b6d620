//! # Store Errors
//!
//! Failures reported by a [`DocumentStore`](super::DocumentStore).

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Filter, update, projection, sort or pipeline the store rejects
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Unique `_id` violated
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend unreachable
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other error raised by the backend
    #[error("{0}")]
    Backend(String),

    /// Backend returned a value outside the extended-value model
    #[error("unrepresentable value: {0}")]
    Unrepresentable(String),

    /// Internal failure (poisoned lock, broken invariant)
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the detail must stay out of client responses
    pub fn is_internal(&self) -> bool {
        matches!(self, StoreError::Unrepresentable(_) | StoreError::Internal(_))
    }
}
