//! # Anchor Graph Repository
//! This crate provides the document store abstraction behind the anchor
//! graph. It includes definitions for errors, interfaces, filters and bulk
//! writes, the transactional retry combinator, and concrete implementations
//! backed by memory and by PostgreSQL.
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod retry;

pub use errors::StoreError;
pub use interfaces::{DocumentStore, StoreTransaction};
pub use memory::{InMemoryStore, StoreFault};
pub use postgres::PostgresStore;
pub use query::{Filter, WriteOp};
pub use retry::with_transaction_retry;
