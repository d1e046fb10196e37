use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::types::object_id::ObjectId;

/// Errors raised while decoding reference strings and object ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("Malformed reference: {0}")]
    Malformed(String),

    #[error("Unknown anchor prefix: {0}")]
    UnknownPrefix(String),

    #[error("Invalid object id: {0}")]
    InvalidObjectId(String),
}

/// The closed set of persisted anchor kinds.
///
/// Each kind owns one collection in the document store and one prefix in the
/// canonical reference string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorKind {
    Node,
    Edge,
    Object,
    Walker,
}

impl AnchorKind {
    pub const ALL: [AnchorKind; 4] = [
        AnchorKind::Node,
        AnchorKind::Edge,
        AnchorKind::Object,
        AnchorKind::Walker,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            AnchorKind::Node => "n",
            AnchorKind::Edge => "e",
            AnchorKind::Object => "o",
            AnchorKind::Walker => "w",
        }
    }

    /// Name of the collection (table) holding documents of this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            AnchorKind::Node => "node",
            AnchorKind::Edge => "edge",
            AnchorKind::Object => "object",
            AnchorKind::Walker => "walker",
        }
    }

    pub fn from_prefix(prefix: &str) -> Result<Self, ReferenceError> {
        match prefix {
            "n" => Ok(AnchorKind::Node),
            "e" => Ok(AnchorKind::Edge),
            "o" => Ok(AnchorKind::Object),
            "w" => Ok(AnchorKind::Walker),
            other => Err(ReferenceError::UnknownPrefix(other.to_string())),
        }
    }
}

/// Canonical external address of an anchor: `<prefix>:<name-or-empty>:<hex id>`.
///
/// Links between anchors are stored as references, which carry the type
/// name alongside the id so that type filters can be applied without
/// loading the linked document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub kind: AnchorKind,
    pub name: Option<String>,
    pub id: ObjectId,
}

impl Reference {
    pub fn new(kind: AnchorKind, name: Option<String>, id: ObjectId) -> Self {
        Self { kind, name, id }
    }

    pub fn node(name: Option<String>, id: ObjectId) -> Self {
        Self::new(AnchorKind::Node, name, id)
    }

    pub fn edge(name: Option<String>, id: ObjectId) -> Self {
        Self::new(AnchorKind::Edge, name, id)
    }

    /// Type name, empty for untyped anchors.
    pub fn type_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [prefix, name, id] = parts.as_slice() else {
            return Err(ReferenceError::Malformed(s.to_string()));
        };

        let kind = AnchorKind::from_prefix(prefix)?;
        let id = ObjectId::from_hex(id)?;
        let name = if name.is_empty() {
            None
        } else {
            Some((*name).to_string())
        };

        Ok(Self { kind, name, id })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind.prefix(), self.type_name(), self.id)
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReferenceVisitor;

        impl Visitor<'_> for ReferenceVisitor {
            type Value = Reference;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a `<prefix>:<name>:<id>` reference string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Reference, E> {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(ReferenceVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed_node_reference() {
        let reference: Reference = "n:Person:507f1f77bcf86cd799439011".parse().unwrap();

        assert_eq!(reference.kind, AnchorKind::Node);
        assert_eq!(reference.name.as_deref(), Some("Person"));
        assert_eq!(reference.id.to_hex(), "507f1f77bcf86cd799439011");
        assert_eq!(reference.to_string(), "n:Person:507f1f77bcf86cd799439011");
    }

    #[test]
    fn test_parse_untyped_edge_reference() {
        let reference: Reference = "e::507f1f77bcf86cd799439011".parse().unwrap();

        assert_eq!(reference.kind, AnchorKind::Edge);
        assert_eq!(reference.name, None);
        assert_eq!(reference.to_string(), "e::507f1f77bcf86cd799439011");
    }

    #[test]
    fn test_walker_handle_prefix() {
        let id = ObjectId::new();
        let handle = Reference::new(AnchorKind::Walker, Some("async_walker".into()), id);

        assert!(handle.to_string().starts_with("w:async_walker:"));
    }

    #[test]
    fn test_malformed_references_are_rejected() {
        assert!(matches!(
            "n:Person".parse::<Reference>(),
            Err(ReferenceError::Malformed(_))
        ));
        assert!(matches!(
            "x::507f1f77bcf86cd799439011".parse::<Reference>(),
            Err(ReferenceError::UnknownPrefix(_))
        ));
        assert!(matches!(
            "n::not-hex".parse::<Reference>(),
            Err(ReferenceError::InvalidObjectId(_))
        ));
        assert!(matches!(
            "n:a:b:507f1f77bcf86cd799439011".parse::<Reference>(),
            Err(ReferenceError::Malformed(_))
        ));
    }

    #[test]
    fn test_reference_serializes_as_string() {
        let reference: Reference = "n:A:507f1f77bcf86cd799439011".parse().unwrap();
        let value = serde_json::to_value(&reference).unwrap();

        assert_eq!(value, serde_json::json!("n:A:507f1f77bcf86cd799439011"));
        assert_eq!(serde_json::from_value::<Reference>(value).unwrap(), reference);
    }
}
