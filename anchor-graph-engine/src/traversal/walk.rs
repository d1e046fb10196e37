use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anchor_graph_repository::{DocumentStore, Filter};
use anchor_graph_shared::{AccessLevel, Anchor, AnchorKind, Links, ObjectId, Reference};
use tracing::debug;

use super::{EdgeRecord, NodeRecord, TraversalQuery, TraversalRound};
use crate::access::effective_level;
use crate::errors::GraphError;
use crate::registry::Registry;

/// Round-by-round breadth-first walk alternating between nodes and edges.
///
/// Each anchor id enters the frontier at most once. Links whose type is
/// filtered out are still listed on the emitted record but not followed.
pub(crate) struct Walk {
    store: Arc<dyn DocumentStore>,
    root: ObjectId,
    detailed: bool,
    node_types: Option<HashSet<String>>,
    edge_types: Option<HashSet<String>>,
    depth: i64,
    node_ids: HashSet<ObjectId>,
    edge_ids: HashSet<ObjectId>,
    frontier: Vec<ObjectId>,
    frontier_kind: AnchorKind,
}

fn admit(
    filter: &Option<HashSet<String>>,
    visited: &mut HashSet<ObjectId>,
    frontier: &mut Vec<ObjectId>,
    reference: &Reference,
) -> String {
    let wanted = filter
        .as_ref()
        .is_none_or(|types| types.is_empty() || types.contains(reference.type_name()));
    if wanted && visited.insert(reference.id) {
        frontier.push(reference.id);
    }
    reference.to_string()
}

impl Walk {
    /// Resolves the start anchor and builds round 0.
    ///
    /// # Returns
    ///
    /// * `Err(GraphError::InvalidReference)` - `source` is malformed
    /// * `Err(GraphError::InvalidSource)` - `source` is not a node or edge
    /// * `Err(GraphError::NotFound)` - The start anchor is absent or unreadable
    pub(crate) async fn start(
        store: Arc<dyn DocumentStore>,
        root: ObjectId,
        query: &TraversalQuery,
    ) -> Result<(Self, TraversalRound), GraphError> {
        let source = match &query.source {
            Some(source) => source.parse::<Reference>()?,
            None => Reference::node(None, root),
        };
        if !matches!(source.kind, AnchorKind::Node | AnchorKind::Edge) {
            return Err(GraphError::InvalidSource(source.to_string()));
        }

        let entry = Registry::new(Arc::clone(&store))
            .resolve_for(&root, &source)
            .await?;

        let mut walk = Self {
            store,
            root,
            detailed: query.detailed,
            node_types: query.node_types.clone(),
            edge_types: query.edge_types.clone(),
            depth: query.depth,
            node_ids: HashSet::new(),
            edge_ids: HashSet::new(),
            frontier: Vec::new(),
            frontier_kind: AnchorKind::Edge,
        };

        let round = match entry.kind() {
            AnchorKind::Node => {
                walk.node_ids.insert(entry.id);
                walk.frontier_kind = AnchorKind::Edge;
                let mut frontier = Vec::new();
                let record = walk.node_record(&entry, &mut frontier);
                walk.frontier = frontier;
                TraversalRound::Nodes(vec![record])
            }
            _ => {
                walk.edge_ids.insert(entry.id);
                walk.frontier_kind = AnchorKind::Node;
                let mut frontier = Vec::new();
                let record = walk.edge_record(&entry, &mut frontier);
                walk.frontier = frontier;
                TraversalRound::Edges(vec![record])
            }
        };

        Ok((walk, round))
    }

    pub(crate) fn has_next(&self) -> bool {
        !self.frontier.is_empty() && self.depth != 0
    }

    /// Loads the current frontier with one query and emits it.
    ///
    /// Anchors the acting root cannot read are dropped silently.
    pub(crate) async fn next_round(&mut self) -> Result<TraversalRound, GraphError> {
        let ids = std::mem::take(&mut self.frontier);
        let kind = self.frontier_kind;
        let documents = self.store.find(kind, &Filter::Ids(ids.clone())).await?;

        let mut loaded: HashMap<ObjectId, Anchor> = HashMap::with_capacity(documents.len());
        for document in documents {
            let anchor = Anchor::from_document(kind, document)?;
            if effective_level(&self.root, &anchor) >= AccessLevel::Read {
                loaded.insert(anchor.id, anchor);
            }
        }
        debug!(
            kind = kind.collection(),
            requested = ids.len(),
            visible = loaded.len(),
            depth = self.depth,
            "Traversal round"
        );

        let anchors: Vec<Anchor> = ids.iter().filter_map(|id| loaded.remove(id)).collect();
        let mut frontier = Vec::new();
        let round = match kind {
            AnchorKind::Edge => {
                self.frontier_kind = AnchorKind::Node;
                TraversalRound::Edges(
                    anchors
                        .iter()
                        .map(|edge| self.edge_record(edge, &mut frontier))
                        .collect(),
                )
            }
            _ => {
                self.frontier_kind = AnchorKind::Edge;
                TraversalRound::Nodes(
                    anchors
                        .iter()
                        .map(|node| self.node_record(node, &mut frontier))
                        .collect(),
                )
            }
        };

        self.frontier = frontier;
        self.depth = self.depth.saturating_sub(1);
        Ok(round)
    }

    fn node_record(&mut self, node: &Anchor, frontier: &mut Vec<ObjectId>) -> NodeRecord {
        let edges = node
            .edges()
            .iter()
            .map(|edge| admit(&self.edge_types, &mut self.edge_ids, frontier, edge))
            .collect();

        NodeRecord {
            id: node.reference().to_string(),
            edges,
            archetype: self.detailed.then(|| node.archetype.clone()),
        }
    }

    fn edge_record(&mut self, edge: &Anchor, frontier: &mut Vec<ObjectId>) -> EdgeRecord {
        let (source, target) = match &edge.links {
            Links::Edge { source, target } => (
                admit(&self.node_types, &mut self.node_ids, frontier, source),
                admit(&self.node_types, &mut self.node_ids, frontier, target),
            ),
            _ => (String::new(), String::new()),
        };

        EdgeRecord {
            id: edge.reference().to_string(),
            source,
            target,
            archetype: self.detailed.then(|| edge.archetype.clone()),
        }
    }
}
