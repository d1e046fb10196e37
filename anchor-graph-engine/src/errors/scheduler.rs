//! Error types for walker execution and task scheduling.
use anchor_graph_repository::StoreError;
use thiserror::Error;

use crate::errors::GraphError;

/// Errors raised by the scheduler API.
///
/// Failures inside a scheduled run never surface here; they are recorded on
/// the walker document and the run is marked FAILED.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unknown walker: {0}")]
    UnknownWalker(String),

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt walker document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("Walker failed: {0}")]
    Walker(#[from] WalkerError),
}

/// Error returned by a walker body.
#[derive(Debug, Error)]
pub enum WalkerError {
    #[error("{0}")]
    Failed(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

impl WalkerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
