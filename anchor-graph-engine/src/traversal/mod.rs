//! Graph traversal, batch and streamed.
//!
//! Both presentations share one walk: round 0 emits the start anchor, and
//! every following round loads the current frontier (edges after nodes,
//! nodes after edges) with a single query. `depth` bounds the number of
//! rounds after the start; a negative depth walks until the frontier is
//! empty.
mod walk;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anchor_graph_repository::DocumentStore;
use anchor_graph_shared::ObjectId;
use async_stream::try_stream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::config::DEFAULT_TRAVERSAL_STREAM_DELAY_MS;
use crate::errors::GraphError;
use walk::Walk;

/// Media type of the streamed response body.
pub const STREAM_MEDIA_TYPE: &str = "application/json";

fn default_depth() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalQuery {
    /// Start reference; the acting root's node when absent.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub detailed: bool,
    #[serde(default = "default_depth")]
    pub depth: i64,
    /// Node type names to follow; all when absent or empty.
    #[serde(default)]
    pub node_types: Option<HashSet<String>>,
    /// Edge type names to follow; all when absent or empty.
    #[serde(default)]
    pub edge_types: Option<HashSet<String>>,
}

impl Default for TraversalQuery {
    fn default() -> Self {
        Self {
            source: None,
            detailed: false,
            depth: default_depth(),
            node_types: None,
            edge_types: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub id: String,
    pub edges: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archetype: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeRecord {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archetype: Option<Map<String, Value>>,
}

/// One streamed record: `{"nodes": [...]}` or `{"edges": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalRound {
    Nodes(Vec<NodeRecord>),
    Edges(Vec<EdgeRecord>),
}

impl TraversalRound {
    /// The record as one newline-terminated JSON line.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Accumulated result of a batch traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraversalResult {
    pub edges: Vec<EdgeRecord>,
    pub nodes: Vec<NodeRecord>,
}

impl TraversalResult {
    fn absorb(&mut self, round: TraversalRound) {
        match round {
            TraversalRound::Nodes(nodes) => self.nodes.extend(nodes),
            TraversalRound::Edges(edges) => self.edges.extend(edges),
        }
    }
}

/// A traversal on behalf of one acting root.
pub struct Traversal {
    store: Arc<dyn DocumentStore>,
    root: ObjectId,
    query: TraversalQuery,
    delay: Duration,
}

impl Traversal {
    pub fn new(store: Arc<dyn DocumentStore>, root: ObjectId, query: TraversalQuery) -> Self {
        Self {
            store,
            root,
            query,
            delay: Duration::from_millis(DEFAULT_TRAVERSAL_STREAM_DELAY_MS),
        }
    }

    /// Sets the pause between streamed rounds.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Runs every round and returns the combined result.
    #[instrument(skip(self), fields(root = %self.root))]
    pub async fn run(&self) -> Result<TraversalResult, GraphError> {
        let (mut walk, first) = Walk::start(Arc::clone(&self.store), self.root, &self.query).await?;
        let mut result = TraversalResult::default();
        result.absorb(first);

        while walk.has_next() {
            result.absorb(walk.next_round().await?);
        }
        Ok(result)
    }

    /// Emits one record per round, pausing between rounds.
    ///
    /// The stream is lazy and not restartable. Dropping it stops the walk
    /// at the next yield point.
    pub fn stream(self) -> impl Stream<Item = Result<TraversalRound, GraphError>> + Send + 'static {
        let Traversal {
            store,
            root,
            query,
            delay,
        } = self;

        try_stream! {
            let (mut walk, first) = Walk::start(store, root, &query).await?;
            yield first;

            while walk.has_next() {
                tokio::time::sleep(delay).await;
                let round = walk.next_round().await?;
                yield round;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_serializes_as_single_key_object() {
        let round = TraversalRound::Edges(vec![EdgeRecord {
            id: "e::000000000000000000000002".into(),
            source: "n::000000000000000000000001".into(),
            target: "n::000000000000000000000003".into(),
            archetype: None,
        }]);

        assert_eq!(
            serde_json::to_value(&round).unwrap(),
            json!({"edges": [{
                "id": "e::000000000000000000000002",
                "source": "n::000000000000000000000001",
                "target": "n::000000000000000000000003"
            }]})
        );
        assert!(round.to_ndjson().unwrap().ends_with("}]}\n"));
    }

    #[test]
    fn test_query_defaults_to_depth_one() {
        let query: TraversalQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(query, TraversalQuery::default());
        assert_eq!(query.depth, 1);
    }
}
