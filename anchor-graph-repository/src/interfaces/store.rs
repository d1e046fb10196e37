//! This module defines the `DocumentStore` and `StoreTransaction` traits, which
//! abstract the per-collection document storage behind the anchor graph.
use anchor_graph_shared::{AnchorKind, ObjectId};
use serde_json::Value;

use crate::errors::StoreError;
use crate::query::{Filter, WriteOp};

/// A trait that defines the interface for a collection-oriented document store.
///
/// Each `AnchorKind` maps to one collection. Documents are JSON objects keyed
/// by their `_id`. Implementors must provide multi-document transactions
/// through [`DocumentStore::begin`] and report retryable failures as
/// [`StoreError::Transient`].
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Loads a single document by id.
    ///
    /// # Arguments
    ///
    /// * `kind` - Collection to read from
    /// * `id` - Document id
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Value))` - The stored document
    /// * `Ok(None)` - No document with this id
    /// * `Err(StoreError)` - Backend failure
    async fn find_by_id(&self, kind: AnchorKind, id: &ObjectId)
    -> Result<Option<Value>, StoreError>;

    /// Loads every document of a collection matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `kind` - Collection to read from
    /// * `filter` - Predicate the returned documents satisfy
    ///
    /// # Returns
    ///
    /// A `Result` with the matching documents in unspecified order.
    async fn find(&self, kind: AnchorKind, filter: &Filter) -> Result<Vec<Value>, StoreError>;

    /// Inserts a new document outside of any transaction.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Document inserted
    /// * `Err(StoreError::DuplicateKey)` - A document with this id already exists
    async fn insert_one(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
        document: Value,
    ) -> Result<(), StoreError>;

    /// Replaces a document only if its current state matches `expected`.
    ///
    /// This is the store's compare-and-set primitive.
    ///
    /// # Arguments
    ///
    /// * `kind` - Collection holding the document
    /// * `id` - Document id
    /// * `expected` - Predicate the current document must satisfy
    /// * `document` - Replacement document
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The document matched and was replaced
    /// * `Ok(false)` - The document is absent or did not match
    /// * `Err(StoreError)` - Backend failure
    async fn replace_if(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
        expected: &Filter,
        document: Value,
    ) -> Result<bool, StoreError>;

    /// Deletes a document only if its current state matches `expected`.
    ///
    /// # Returns
    ///
    /// `Ok(true)` when a document was deleted.
    async fn delete_if(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
        expected: &Filter,
    ) -> Result<bool, StoreError>;

    /// Opens a multi-document transaction.
    ///
    /// # Returns
    ///
    /// A boxed [`StoreTransaction`]; nothing written through it is visible
    /// until [`StoreTransaction::commit`] succeeds.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// An open multi-document transaction.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    /// Stages a batch of writes against one collection.
    ///
    /// # Arguments
    ///
    /// * `kind` - Target collection
    /// * `ops` - Writes applied in order (empty slices are no-ops)
    async fn bulk_write(&mut self, kind: AnchorKind, ops: &[WriteOp]) -> Result<(), StoreError>;

    /// Makes every staged write visible atomically.
    ///
    /// On error no staged write is visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every staged write.
    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}
