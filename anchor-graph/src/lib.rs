//! # Anchor Graph
//!
//! Service around the anchor graph engine: it connects the document store,
//! creates the system roots, and drives scheduled walkers until shutdown.
//!
//! ## Modules
//!
//! - [`config`]: Environment configuration and dependency initialization
//! - [`service`]: Scheduler driver lifecycle
//! - [`errors`]: Error types for the service

pub mod config;
pub mod errors;
pub mod service;

pub use config::{Dependencies, StoreBackend};
pub use errors::ServiceError;
pub use service::Service;
