use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::access::Access;
use crate::types::object_id::{ObjectId, PUBLIC_ROOT_ID, SUPER_ROOT_ID};
use crate::types::reference::{AnchorKind, Reference};

/// Kind-specific links of an anchor.
///
/// Links are references (id plus type tag), never embedded copies, so a
/// working set can hold both ends of a cycle without owning either twice.
#[derive(Debug, Clone, PartialEq)]
pub enum Links {
    Node { edges: Vec<Reference> },
    Edge { source: Reference, target: Reference },
    Object,
}

/// Identity and metadata record of a persisted node, edge or object.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub id: ObjectId,
    pub name: Option<String>,
    pub root: Option<ObjectId>,
    pub access: Access,
    pub archetype: Map<String, Value>,
    pub links: Links,
}

/// On-disk shape shared by the three anchor collections.
#[derive(Serialize, Deserialize)]
struct AnchorDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    root: Option<ObjectId>,
    #[serde(default)]
    access: Access,
    #[serde(default)]
    archetype: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    edges: Option<Vec<Reference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<Reference>,
}

impl Anchor {
    /// A fresh, unconnected node owned by `root`.
    pub fn new_node(name: Option<String>, root: ObjectId, archetype: Map<String, Value>) -> Self {
        Self {
            id: ObjectId::new(),
            name,
            root: Some(root),
            access: Access::default(),
            archetype,
            links: Links::Node { edges: Vec::new() },
        }
    }

    pub fn new_edge(
        name: Option<String>,
        root: ObjectId,
        source: Reference,
        target: Reference,
        archetype: Map<String, Value>,
    ) -> Self {
        Self {
            id: ObjectId::new(),
            name,
            root: Some(root),
            access: Access::default(),
            archetype,
            links: Links::Edge { source, target },
        }
    }

    pub fn new_object(name: Option<String>, root: ObjectId, archetype: Map<String, Value>) -> Self {
        Self {
            id: ObjectId::new(),
            name,
            root: Some(root),
            access: Access::default(),
            archetype,
            links: Links::Object,
        }
    }

    /// A root node: it owns itself.
    pub fn new_root(id: ObjectId) -> Self {
        Self {
            id,
            name: None,
            root: Some(id),
            access: Access::default(),
            archetype: Map::new(),
            links: Links::Node { edges: Vec::new() },
        }
    }

    /// One of the two system roots. They carry no owner.
    pub fn system_root(id: ObjectId) -> Self {
        Self {
            root: None,
            ..Self::new_root(id)
        }
    }

    pub fn kind(&self) -> AnchorKind {
        match self.links {
            Links::Node { .. } => AnchorKind::Node,
            Links::Edge { .. } => AnchorKind::Edge,
            Links::Object => AnchorKind::Object,
        }
    }

    pub fn reference(&self) -> Reference {
        Reference::new(self.kind(), self.name.clone(), self.id)
    }

    /// True for the system roots and for tenant roots (nodes owning themselves).
    pub fn is_root(&self) -> bool {
        self.id == SUPER_ROOT_ID || self.id == PUBLIC_ROOT_ID || self.root == Some(self.id)
    }

    /// Incident edges of a node; empty for other kinds.
    pub fn edges(&self) -> &[Reference] {
        match &self.links {
            Links::Node { edges } => edges,
            _ => &[],
        }
    }

    pub fn to_document(&self) -> Value {
        let (edges, source, target) = match &self.links {
            Links::Node { edges } => (Some(edges.clone()), None, None),
            Links::Edge { source, target } => (None, Some(source.clone()), Some(target.clone())),
            Links::Object => (None, None, None),
        };

        let document = AnchorDocument {
            id: self.id,
            name: self.name.clone(),
            root: self.root,
            access: self.access.clone(),
            archetype: self.archetype.clone(),
            edges,
            source,
            target,
        };
        // Every field serializes to plain JSON, so this cannot fail.
        serde_json::to_value(document).unwrap_or(Value::Null)
    }

    pub fn from_document(kind: AnchorKind, document: Value) -> Result<Self, serde_json::Error> {
        let document: AnchorDocument = serde_json::from_value(document)?;

        let links = match kind {
            AnchorKind::Node => Links::Node {
                edges: document.edges.unwrap_or_default(),
            },
            AnchorKind::Edge => match (document.source, document.target) {
                (Some(source), Some(target)) => Links::Edge { source, target },
                _ => {
                    return Err(serde_json::Error::custom(format!(
                        "edge {} is missing its source or target",
                        document.id
                    )));
                }
            },
            AnchorKind::Object => Links::Object,
            AnchorKind::Walker => {
                return Err(serde_json::Error::custom(
                    "walker documents are not anchors",
                ));
            }
        };

        Ok(Self {
            id: document.id,
            name: document.name,
            root: document.root,
            access: document.access,
            archetype: document.archetype,
            links,
        })
    }
}
