//! Bulk commit of a working set.
//!
//! All upserts and deletions of one working set are written in a single
//! store transaction. Transient failures retry the whole transaction; any
//! other failure leaves storage untouched and the working set's marks intact.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anchor_graph_repository::{Filter, WriteOp, with_transaction_retry};
use anchor_graph_shared::{Anchor, AnchorKind, Reference};
use tracing::{error, info, instrument};

use crate::config::EngineConfig;
use crate::errors::GraphError;
use crate::memory::Memory;

/// Pending writes of a working set.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangeSet {
    pub upserts: Vec<Anchor>,
    pub deletions: Vec<Reference>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty()
    }

    /// Store writes grouped by collection.
    ///
    /// Deleting a node also deletes every stored edge that points at it, so
    /// no edge outlives either endpoint.
    pub fn write_ops(&self) -> Vec<(AnchorKind, Vec<WriteOp>)> {
        [AnchorKind::Node, AnchorKind::Edge, AnchorKind::Object]
            .into_iter()
            .filter_map(|kind| {
                let mut ops: Vec<WriteOp> = self
                    .upserts
                    .iter()
                    .filter(|anchor| anchor.kind() == kind)
                    .map(|anchor| WriteOp::Upsert {
                        id: anchor.id,
                        document: anchor.to_document(),
                    })
                    .collect();

                ops.extend(
                    self.deletions
                        .iter()
                        .filter(|reference| reference.kind == kind)
                        .map(|reference| WriteOp::Delete { id: reference.id }),
                );

                if kind == AnchorKind::Edge {
                    ops.extend(
                        self.deletions
                            .iter()
                            .filter(|reference| reference.kind == AnchorKind::Node)
                            .map(|node| {
                                let node = node.to_string();
                                WriteOp::DeleteMany(Filter::Or(vec![
                                    Filter::eq(&["source"], node.clone()),
                                    Filter::eq(&["target"], node),
                                ]))
                            }),
                    );
                }

                (!ops.is_empty()).then_some((kind, ops))
            })
            .collect()
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitResult {
    pub upserted: usize,
    pub deleted: usize,
    /// Transactions attempted; 0 when there was nothing to write.
    pub attempts: usize,
}

/// Persists every pending change of `memory` atomically.
///
/// Unconnected nodes are pruned first (see [`Memory::prune`]).
///
/// # Returns
///
/// * `Ok(CommitResult)` - All changes are stored and the working set's marks are cleared
/// * `Err(GraphError::Store)` - Nothing was stored; the marks are kept and the prune is undone
#[instrument(skip(memory, config), fields(root = %memory.root()))]
pub async fn commit(memory: &mut Memory, config: &EngineConfig) -> Result<CommitResult, GraphError> {
    let pruned = memory.prune_orphans();
    let changes = memory.diff();
    if changes.is_empty() {
        return Ok(CommitResult::default());
    }

    let ops = changes.write_ops();
    let store = Arc::clone(memory.store());
    let attempts = AtomicUsize::new(0);

    let outcome = with_transaction_retry(config.max_transaction_retry, |attempt| {
        attempts.store(attempt, Ordering::SeqCst);
        let store = Arc::clone(&store);
        let ops = &ops;
        async move {
            let mut tx = store.begin().await?;
            for (kind, batch) in ops {
                if let Err(error) = tx.bulk_write(*kind, batch).await {
                    let _ = tx.abort().await;
                    return Err(error);
                }
            }
            tx.commit().await
        }
    })
    .await;

    let attempts = attempts.load(Ordering::SeqCst);
    match outcome {
        Ok(()) => {
            memory.clear_marks();
            let result = CommitResult {
                upserted: changes.upserts.len(),
                deleted: changes.deletions.len(),
                attempts,
            };
            info!(
                upserted = result.upserted,
                deleted = result.deleted,
                attempts,
                "Committed working set"
            );
            Ok(result)
        }
        Err(err) => {
            memory.restore_pruned(&pruned);
            error!(
                error = %err,
                attempts,
                max_attempts = config.max_transaction_retry + 1,
                upserts = changes.upserts.len(),
                deletions = changes.deletions.len(),
                "Commit failed"
            );
            Err(GraphError::Store(err))
        }
    }
}
