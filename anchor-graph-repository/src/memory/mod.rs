//! In-memory implementation of the document store.
//!
//! Collections live behind a single `tokio::sync::RwLock`, so a committed
//! transaction is applied under one write guard and readers never observe a
//! partial commit. Commit faults can be queued to exercise retry and
//! atomicity paths without a database.
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anchor_graph_shared::{AnchorKind, ObjectId};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::errors::StoreError;
use crate::interfaces::{DocumentStore, StoreTransaction};
use crate::query::{Filter, WriteOp};

type Collections = HashMap<AnchorKind, BTreeMap<ObjectId, Value>>;

/// Failure injected into the next commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// Reported as [`StoreError::Transient`].
    Transient,
    /// Reported as [`StoreError::Aborted`].
    Permanent,
}

#[derive(Default)]
struct Inner {
    collections: RwLock<Collections>,
    faults: Mutex<VecDeque<StoreFault>>,
    commit_attempts: AtomicUsize,
}

/// Cloneable handle to a shared in-memory store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fault; each commit consumes at most one queued fault.
    pub async fn inject_commit_fault(&self, fault: StoreFault) {
        self.inner.faults.lock().await.push_back(fault);
    }

    /// Number of commits attempted, including failed ones.
    pub fn commit_attempts(&self) -> usize {
        self.inner.commit_attempts.load(Ordering::SeqCst)
    }

    pub async fn count(&self, kind: AnchorKind) -> usize {
        self.inner
            .collections
            .read()
            .await
            .get(&kind)
            .map_or(0, BTreeMap::len)
    }

    /// Snapshot of every document in a collection, ordered by id.
    pub async fn documents(&self, kind: AnchorKind) -> Vec<Value> {
        self.inner
            .collections
            .read()
            .await
            .get(&kind)
            .map(|collection| collection.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn apply(collections: &mut Collections, kind: AnchorKind, op: WriteOp) {
    let collection = collections.entry(kind).or_default();
    match op {
        WriteOp::Upsert { id, document } => {
            collection.insert(id, document);
        }
        WriteOp::InsertIfAbsent { id, document } => {
            collection.entry(id).or_insert(document);
        }
        WriteOp::Delete { id } => {
            collection.remove(&id);
        }
        WriteOp::DeleteMany(filter) => {
            collection.retain(|_, document| !filter.matches(document));
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_by_id(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
    ) -> Result<Option<Value>, StoreError> {
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(&kind)
            .and_then(|collection| collection.get(id))
            .cloned())
    }

    async fn find(&self, kind: AnchorKind, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        let collections = self.inner.collections.read().await;
        let Some(collection) = collections.get(&kind) else {
            return Ok(Vec::new());
        };

        if let Filter::Ids(ids) = filter {
            return Ok(ids
                .iter()
                .filter_map(|id| collection.get(id))
                .cloned()
                .collect());
        }

        Ok(collection
            .values()
            .filter(|document| filter.matches(document))
            .cloned()
            .collect())
    }

    async fn insert_one(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
        document: Value,
    ) -> Result<(), StoreError> {
        let mut collections = self.inner.collections.write().await;
        let collection = collections.entry(kind).or_default();
        if collection.contains_key(id) {
            return Err(StoreError::DuplicateKey(format!("{}/{}", kind.collection(), id)));
        }
        collection.insert(*id, document);
        Ok(())
    }

    async fn replace_if(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
        expected: &Filter,
        document: Value,
    ) -> Result<bool, StoreError> {
        let mut collections = self.inner.collections.write().await;
        match collections.get_mut(&kind).and_then(|c| c.get_mut(id)) {
            Some(current) if expected.matches(current) => {
                *current = document;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if(
        &self,
        kind: AnchorKind,
        id: &ObjectId,
        expected: &Filter,
    ) -> Result<bool, StoreError> {
        let mut collections = self.inner.collections.write().await;
        let Some(collection) = collections.get_mut(&kind) else {
            return Ok(false);
        };
        if collection.get(id).is_some_and(|current| expected.matches(current)) {
            collection.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
        }))
    }
}

/// Transaction that buffers writes until commit.
pub struct InMemoryTransaction {
    store: InMemoryStore,
    staged: Vec<(AnchorKind, WriteOp)>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn bulk_write(&mut self, kind: AnchorKind, ops: &[WriteOp]) -> Result<(), StoreError> {
        self.staged
            .extend(ops.iter().cloned().map(|op| (kind, op)));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let inner = &self.store.inner;
        inner.commit_attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(fault) = inner.faults.lock().await.pop_front() {
            debug!(?fault, staged = self.staged.len(), "Injected commit fault");
            return Err(match fault {
                StoreFault::Transient => StoreError::Transient("write conflict".to_string()),
                StoreFault::Permanent => StoreError::Aborted("commit rejected".to_string()),
            });
        }

        let mut collections = inner.collections.write().await;
        for (kind, op) in self.staged {
            apply(&mut collections, kind, op);
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
