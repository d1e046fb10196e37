//! Error types for the anchor graph engine.
mod graph;
mod scheduler;

pub use graph::GraphError;
pub use scheduler::{SchedulerError, WalkerError};
