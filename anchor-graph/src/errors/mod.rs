//! Error types for the anchor graph service.

use anchor_graph_engine::{GraphError, SchedulerError};
use anchor_graph_repository::StoreError;
use thiserror::Error;

/// Errors that can occur during service initialization or execution.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Document store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Graph bootstrap error.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Scheduler error.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The scheduler driver task ended abnormally.
    #[error("Driver task failed: {0}")]
    Driver(String),
}

impl ServiceError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
