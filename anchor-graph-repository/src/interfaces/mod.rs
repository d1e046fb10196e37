//! This module defines and re-exports the interfaces for the document store.
//! It serves as a central point for accessing traits related to data interaction.
mod store;

pub use store::{DocumentStore, StoreTransaction};
