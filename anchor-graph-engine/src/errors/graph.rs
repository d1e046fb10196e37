//! Error types for graph operations: resolution, access, working set and commit.
use anchor_graph_repository::StoreError;
use anchor_graph_shared::ReferenceError;
use thiserror::Error;

/// Represents errors raised by registry, working set, commit and traversal
/// operations.
///
/// Callers outside the owning root should not be able to tell an absent
/// anchor from an unreadable one; see [`GraphError::is_absent`].
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Invalid reference: {0}")]
    InvalidReference(#[from] ReferenceError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Document store is not initialized")]
    StoreNotInitialized,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt document: {0}")]
    Document(#[from] serde_json::Error),
}

impl GraphError {
    pub fn not_found(what: impl ToString) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn access_denied(what: impl ToString) -> Self {
        Self::AccessDenied(what.to_string())
    }

    /// True when the error should be reported to the caller as "resource absent".
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            GraphError::InvalidReference(_) | GraphError::NotFound(_) | GraphError::InvalidSource(_)
        )
    }
}
