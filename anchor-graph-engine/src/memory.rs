//! Per-operation working set.
//!
//! A `Memory` caches every anchor one logical operation touches, keyed by
//! id, and records which of them must be written or deleted at commit.
//! Links between cached anchors are references, so the cache holds each
//! anchor exactly once even when nodes and edges form cycles.
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use anchor_graph_repository::{DocumentStore, Filter};
use anchor_graph_shared::{AccessLevel, Anchor, AnchorKind, Links, ObjectId, Reference};
use serde_json::{Map, Value};
use tracing::debug;

use crate::access::effective_level;
use crate::commit::ChangeSet;
use crate::errors::GraphError;

pub struct Memory {
    store: Arc<dyn DocumentStore>,
    root: ObjectId,
    anchors: HashMap<ObjectId, Anchor>,
    dirty: BTreeSet<ObjectId>,
    deleted: BTreeSet<ObjectId>,
    retained: HashSet<ObjectId>,
    manual: bool,
}

impl Memory {
    /// Creates an empty working set acting as `root`.
    pub fn new(store: Arc<dyn DocumentStore>, root: ObjectId) -> Self {
        Self {
            store,
            root,
            anchors: HashMap::new(),
            dirty: BTreeSet::new(),
            deleted: BTreeSet::new(),
            retained: HashSet::new(),
            manual: false,
        }
    }

    /// The acting root.
    pub fn root(&self) -> &ObjectId {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Reference to the acting root's own node.
    pub fn root_reference(&self) -> Reference {
        Reference::node(None, self.root)
    }

    /// Returns the anchor behind `reference`, loading and caching it on first use.
    ///
    /// # Returns
    ///
    /// * `Ok(Anchor)` - A copy of the cached anchor
    /// * `Err(GraphError::NotFound)` - Absent, deleted in this working set, or unreadable
    pub async fn get(&mut self, reference: &Reference) -> Result<Anchor, GraphError> {
        self.get_by_id(reference.kind, &reference.id).await
    }

    pub async fn get_by_id(&mut self, kind: AnchorKind, id: &ObjectId) -> Result<Anchor, GraphError> {
        if self.deleted.contains(id) {
            return Err(GraphError::not_found(id));
        }
        if let Some(anchor) = self.anchors.get(id) {
            if anchor.kind() != kind {
                return Err(GraphError::not_found(id));
            }
            return Ok(anchor.clone());
        }

        let document = self
            .store
            .find_by_id(kind, id)
            .await?
            .ok_or_else(|| GraphError::not_found(id))?;
        let anchor = Anchor::from_document(kind, document)?;
        if effective_level(&self.root, &anchor) < AccessLevel::Read {
            return Err(GraphError::not_found(id));
        }

        self.anchors.insert(*id, anchor.clone());
        Ok(anchor)
    }

    /// Loads every uncached anchor of `kind` among `ids` with a single query.
    ///
    /// # Returns
    ///
    /// The readable, non-deleted anchors among `ids`, in the order of `ids`.
    pub async fn get_many(
        &mut self,
        kind: AnchorKind,
        ids: &[ObjectId],
    ) -> Result<Vec<Anchor>, GraphError> {
        let missing: Vec<ObjectId> = ids
            .iter()
            .filter(|id| !self.anchors.contains_key(*id) && !self.deleted.contains(*id))
            .copied()
            .collect();

        if !missing.is_empty() {
            for document in self.store.find(kind, &Filter::Ids(missing)).await? {
                let anchor = Anchor::from_document(kind, document)?;
                if effective_level(&self.root, &anchor) >= AccessLevel::Read {
                    self.anchors.insert(anchor.id, anchor);
                }
            }
        }

        Ok(ids
            .iter()
            .filter(|id| !self.deleted.contains(*id))
            .filter_map(|id| self.anchors.get(id))
            .filter(|anchor| anchor.kind() == kind)
            .cloned()
            .collect())
    }

    /// Warms the cache for a mixed list of references, one query per kind.
    pub async fn load_many(&mut self, references: &[Reference]) -> Result<(), GraphError> {
        let mut by_kind: HashMap<AnchorKind, Vec<ObjectId>> = HashMap::new();
        for reference in references {
            by_kind.entry(reference.kind).or_default().push(reference.id);
        }
        for (kind, ids) in by_kind {
            self.get_many(kind, &ids).await?;
        }
        Ok(())
    }

    /// Every readable node and edge linked to `start` through the working
    /// set, `start` first.
    ///
    /// Links are read from cached anchors, so connections made in this
    /// working set count before they are committed. Deleted anchors do not.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Reference>)` - Reachable anchors in breadth-first order
    /// * `Err(GraphError::InvalidSource)` - `start` is not a node or edge
    /// * `Err(GraphError::NotFound)` - `start` is absent or unreadable
    pub async fn reachable(&mut self, start: &Reference) -> Result<Vec<Reference>, GraphError> {
        if !matches!(start.kind, AnchorKind::Node | AnchorKind::Edge) {
            return Err(GraphError::InvalidSource(start.to_string()));
        }
        let entry = self.get(start).await?;

        let mut visited = HashSet::from([entry.id]);
        let mut reached = vec![entry.reference()];
        let mut frontier = vec![entry];

        while !frontier.is_empty() {
            let mut nodes = Vec::new();
            let mut edges = Vec::new();
            for anchor in &frontier {
                let linked: Vec<&Reference> = match &anchor.links {
                    Links::Node { edges: incident } => incident.iter().collect(),
                    Links::Edge { source, target } => vec![source, target],
                    Links::Object => Vec::new(),
                };
                for reference in linked {
                    if !visited.insert(reference.id) {
                        continue;
                    }
                    match reference.kind {
                        AnchorKind::Node => nodes.push(reference.id),
                        AnchorKind::Edge => edges.push(reference.id),
                        _ => {}
                    }
                }
            }

            frontier = self.get_many(AnchorKind::Node, &nodes).await?;
            frontier.extend(self.get_many(AnchorKind::Edge, &edges).await?);
            reached.extend(frontier.iter().map(Anchor::reference));
        }

        Ok(reached)
    }

    /// Cached anchor, without touching the store.
    pub fn cached(&self, id: &ObjectId) -> Option<&Anchor> {
        self.anchors.get(id).filter(|_| !self.deleted.contains(id))
    }

    /// Creates a node owned by the acting root.
    ///
    /// An unconnected node is pruned at commit unless retained.
    pub fn create_node(&mut self, name: Option<&str>, archetype: Map<String, Value>) -> Reference {
        self.insert_new(Anchor::new_node(name.map(str::to_string), self.root, archetype))
    }

    pub fn create_object(&mut self, name: Option<&str>, archetype: Map<String, Value>) -> Reference {
        self.insert_new(Anchor::new_object(name.map(str::to_string), self.root, archetype))
    }

    fn insert_new(&mut self, anchor: Anchor) -> Reference {
        let reference = anchor.reference();
        self.dirty.insert(anchor.id);
        self.anchors.insert(anchor.id, anchor);
        reference
    }

    /// Creates an edge from `source` to `target` and links it on both nodes.
    ///
    /// # Returns
    ///
    /// * `Ok(Reference)` - The new edge
    /// * `Err(GraphError::AccessDenied)` - Either endpoint is not writable
    /// * `Err(GraphError::InvalidOperation)` - An endpoint is not a node
    pub async fn connect(
        &mut self,
        source: &Reference,
        target: &Reference,
        edge_name: Option<&str>,
        archetype: Map<String, Value>,
    ) -> Result<Reference, GraphError> {
        let source = self.get(source).await?;
        let target = self.get(target).await?;
        for endpoint in [&source, &target] {
            if endpoint.kind() != AnchorKind::Node {
                return Err(GraphError::InvalidOperation(format!(
                    "{} is not a node",
                    endpoint.reference()
                )));
            }
            self.ensure_writable(endpoint)?;
        }

        let edge = Anchor::new_edge(
            edge_name.map(str::to_string),
            self.root,
            source.reference(),
            target.reference(),
            archetype,
        );
        let edge_ref = self.insert_new(edge);

        self.link(&source.id, &edge_ref);
        if target.id != source.id {
            self.link(&target.id, &edge_ref);
        }
        Ok(edge_ref)
    }

    fn link(&mut self, node: &ObjectId, edge: &Reference) {
        if let Some(Anchor {
            links: Links::Node { edges },
            ..
        }) = self.anchors.get_mut(node)
        {
            edges.push(edge.clone());
            self.dirty.insert(*node);
        }
    }

    /// Merges `archetype` into the anchor's archetype.
    pub async fn update(
        &mut self,
        reference: &Reference,
        archetype: Map<String, Value>,
    ) -> Result<(), GraphError> {
        self.get(reference).await?;
        self.modify(&reference.id, move |anchor| anchor.archetype.extend(archetype))
    }

    /// Removes an edge from both endpoints and queues it for deletion.
    ///
    /// Endpoints that no longer exist are ignored.
    pub async fn detach(&mut self, edge: &Reference) -> Result<(), GraphError> {
        let edge = self.get(edge).await?;
        let Links::Edge { source, target } = &edge.links else {
            return Err(GraphError::InvalidOperation(format!(
                "{} is not an edge",
                edge.reference()
            )));
        };
        self.ensure_writable(&edge)?;

        let mut endpoints = Vec::new();
        for endpoint in [source, target] {
            match self.get(endpoint).await {
                Ok(node) => {
                    self.ensure_writable(&node)?;
                    endpoints.push(node.id);
                }
                Err(GraphError::NotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }

        for node in endpoints {
            self.unlink(&node, &edge.id);
        }
        self.mark_deleted(&edge.id);
        Ok(())
    }

    fn unlink(&mut self, node: &ObjectId, edge: &ObjectId) {
        if let Some(Anchor {
            links: Links::Node { edges },
            ..
        }) = self.anchors.get_mut(node)
        {
            edges.retain(|reference| reference.id != *edge);
            self.dirty.insert(*node);
        }
    }

    /// Deletes an anchor. Destroying a node first detaches all of its edges.
    pub async fn destroy(&mut self, reference: &Reference) -> Result<(), GraphError> {
        let anchor = self.get(reference).await?;
        self.ensure_writable(&anchor)?;

        match &anchor.links {
            Links::Node { edges } => {
                if anchor.is_root() {
                    return Err(GraphError::InvalidOperation(format!(
                        "root {} cannot be destroyed",
                        anchor.id
                    )));
                }
                for edge in edges {
                    match self.detach(edge).await {
                        Ok(()) | Err(GraphError::NotFound(_)) => {}
                        Err(error) => return Err(error),
                    }
                }
                self.mark_deleted(&anchor.id);
            }
            Links::Edge { .. } => self.detach(reference).await?,
            Links::Object => self.mark_deleted(&anchor.id),
        }
        Ok(())
    }

    /// Queues a cached anchor for upsert at commit.
    pub fn mark_dirty(&mut self, id: &ObjectId) {
        if self.anchors.contains_key(id) && !self.deleted.contains(id) {
            self.dirty.insert(*id);
        }
    }

    /// Queues a cached anchor for deletion at commit, superseding any dirty mark.
    pub fn mark_deleted(&mut self, id: &ObjectId) {
        if self.anchors.contains_key(id) {
            self.dirty.remove(id);
            self.deleted.insert(*id);
        }
    }

    pub fn is_dirty(&self, id: &ObjectId) -> bool {
        self.dirty.contains(id)
    }

    pub fn is_deleted(&self, id: &ObjectId) -> bool {
        self.deleted.contains(id)
    }

    /// Turns automatic pruning off for the whole working set.
    pub fn set_manual(&mut self, manual: bool) {
        self.manual = manual;
    }

    /// Excludes one node from automatic pruning.
    pub fn retain(&mut self, id: &ObjectId) {
        self.retained.insert(*id);
    }

    /// Applies `mutate` to a cached, writable anchor and marks it dirty.
    pub(crate) fn modify<F>(&mut self, id: &ObjectId, mutate: F) -> Result<(), GraphError>
    where
        F: FnOnce(&mut Anchor),
    {
        if self.deleted.contains(id) {
            return Err(GraphError::not_found(id));
        }
        let root = self.root;
        let anchor = self
            .anchors
            .get_mut(id)
            .ok_or_else(|| GraphError::not_found(id))?;
        if effective_level(&root, anchor) < AccessLevel::Write {
            return Err(GraphError::access_denied(anchor.reference()));
        }

        mutate(anchor);
        self.dirty.insert(*id);
        Ok(())
    }

    fn ensure_writable(&self, anchor: &Anchor) -> Result<(), GraphError> {
        if effective_level(&self.root, anchor) < AccessLevel::Write {
            return Err(GraphError::access_denied(anchor.reference()));
        }
        Ok(())
    }

    /// Queues every unconnected, non-root, writable node for deletion.
    ///
    /// Does nothing in manual mode. Retained nodes are kept.
    ///
    /// # Returns
    ///
    /// The number of nodes queued.
    pub fn prune(&mut self) -> usize {
        self.prune_orphans().len()
    }

    /// Prunes like [`Memory::prune`] and returns what is needed to undo it:
    /// each pruned id and whether it was dirty before.
    pub(crate) fn prune_orphans(&mut self) -> Vec<(ObjectId, bool)> {
        if self.manual {
            return Vec::new();
        }

        let orphans: Vec<ObjectId> = self
            .anchors
            .values()
            .filter(|anchor| {
                matches!(&anchor.links, Links::Node { edges } if edges.is_empty())
                    && !anchor.is_root()
                    && !self.retained.contains(&anchor.id)
                    && !self.deleted.contains(&anchor.id)
                    && effective_level(&self.root, anchor) == AccessLevel::Write
            })
            .map(|anchor| anchor.id)
            .collect();

        orphans
            .into_iter()
            .map(|id| {
                debug!(node = %id, "Pruning unconnected node");
                let was_dirty = self.dirty.contains(&id);
                self.mark_deleted(&id);
                (id, was_dirty)
            })
            .collect()
    }

    /// Reverts [`Memory::prune_orphans`] after a failed commit.
    pub(crate) fn restore_pruned(&mut self, pruned: &[(ObjectId, bool)]) {
        for (id, was_dirty) in pruned {
            self.deleted.remove(id);
            if *was_dirty {
                self.dirty.insert(*id);
            }
        }
    }

    /// Pending changes.
    ///
    /// Anchors the acting root cannot write are left out.
    pub fn diff(&self) -> ChangeSet {
        let writable = |id: &ObjectId| {
            self.anchors
                .get(id)
                .filter(|anchor| effective_level(&self.root, anchor) == AccessLevel::Write)
        };

        ChangeSet {
            upserts: self.dirty.iter().filter_map(writable).cloned().collect(),
            deletions: self
                .deleted
                .iter()
                .filter_map(writable)
                .map(Anchor::reference)
                .collect(),
        }
    }

    /// Forgets committed marks and evicts deleted anchors.
    pub(crate) fn clear_marks(&mut self) {
        for id in std::mem::take(&mut self.deleted) {
            self.anchors.remove(&id);
        }
        self.dirty.clear();
    }
}
