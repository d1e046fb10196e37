//! Error types for the anchor graph repository.
//! Consolidates and re-exports error types related to document store operations.
mod store;

pub use store::StoreError;
