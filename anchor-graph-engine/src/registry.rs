//! Identity resolution and the process-wide document store handle.
//!
//! Engine components take an explicit `Arc<dyn DocumentStore>`. The global
//! handle installed here is only a default for the service binary; tests
//! call [`reset`] between cases.
use std::sync::Arc;

use anchor_graph_repository::{DocumentStore, WriteOp, with_transaction_retry};
use anchor_graph_shared::{
    AccessLevel, Anchor, AnchorKind, ObjectId, PUBLIC_ROOT_ID, Reference, SUPER_ROOT_ID,
};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use tracing::{info, instrument};

use crate::access::effective_level;
use crate::errors::GraphError;

lazy_static! {
    static ref STORE: RwLock<Option<Arc<dyn DocumentStore>>> = RwLock::new(None);
}

/// Installs the process-wide store, replacing any previous one.
pub fn install(store: Arc<dyn DocumentStore>) {
    *STORE.write() = Some(store);
}

/// The process-wide store.
///
/// # Returns
///
/// * `Ok(Arc<dyn DocumentStore>)` - The installed store
/// * `Err(GraphError::StoreNotInitialized)` - [`install`] was never called, or [`reset`] ran since
pub fn store() -> Result<Arc<dyn DocumentStore>, GraphError> {
    STORE.read().clone().ok_or(GraphError::StoreNotInitialized)
}

/// Drops the process-wide store.
pub fn reset() {
    *STORE.write() = None;
}

/// Resolves references to anchors.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn DocumentStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Registry over the process-wide store.
    pub fn global() -> Result<Self, GraphError> {
        Ok(Self::new(store()?))
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Loads the anchor a reference points to.
    ///
    /// # Returns
    ///
    /// * `Ok(Anchor)` - The stored anchor
    /// * `Err(GraphError::NotFound)` - No such anchor, or a walker reference
    pub async fn resolve(&self, reference: &Reference) -> Result<Anchor, GraphError> {
        if reference.kind == AnchorKind::Walker {
            return Err(GraphError::not_found(reference));
        }

        let document = self
            .store
            .find_by_id(reference.kind, &reference.id)
            .await?
            .ok_or_else(|| GraphError::not_found(reference))?;
        Ok(Anchor::from_document(reference.kind, document)?)
    }

    /// Parses and resolves a reference string.
    pub async fn resolve_str(&self, reference: &str) -> Result<Anchor, GraphError> {
        self.resolve(&reference.parse()?).await
    }

    /// Resolves an anchor the acting root may read.
    ///
    /// Unreadable anchors are reported as `NotFound` so their existence is
    /// not revealed.
    pub async fn resolve_for(
        &self,
        acting_root: &ObjectId,
        reference: &Reference,
    ) -> Result<Anchor, GraphError> {
        let anchor = self.resolve(reference).await?;
        if effective_level(acting_root, &anchor) < AccessLevel::Read {
            return Err(GraphError::not_found(reference));
        }
        Ok(anchor)
    }

    /// Creates the super and public roots if they are missing.
    ///
    /// Existing roots are left untouched. Runs as one transaction under the
    /// transient retry bound.
    #[instrument(skip(self))]
    pub async fn ensure_system_roots(&self, max_retries: usize) -> Result<(), GraphError> {
        let ops: Vec<WriteOp> = [SUPER_ROOT_ID, PUBLIC_ROOT_ID]
            .into_iter()
            .map(|id| WriteOp::InsertIfAbsent {
                id,
                document: Anchor::system_root(id).to_document(),
            })
            .collect();

        with_transaction_retry(max_retries, |_| {
            let store = Arc::clone(&self.store);
            let ops = ops.clone();
            async move {
                let mut tx = store.begin().await?;
                tx.bulk_write(AnchorKind::Node, &ops).await?;
                tx.commit().await
            }
        })
        .await?;

        info!("System roots ready");
        Ok(())
    }

    /// Creates and persists a new tenant root node.
    pub async fn create_user_root(&self) -> Result<Anchor, GraphError> {
        let root = Anchor::new_root(ObjectId::new());
        self.store
            .insert_one(AnchorKind::Node, &root.id, root.to_document())
            .await?;
        info!(root = %root.id, "Created root");
        Ok(root)
    }
}
