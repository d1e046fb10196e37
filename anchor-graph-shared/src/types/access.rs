use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::object_id::ObjectId;

/// Permission level granted on an anchor. Levels are totally ordered.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    #[default]
    NoAccess,
    Read,
    Write,
}

/// Explicit per-root grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootAccess {
    #[serde(default)]
    pub anchors: BTreeMap<ObjectId, AccessLevel>,
}

/// Permission document stored on every anchor.
///
/// `all` applies to any root without an explicit entry in `roots.anchors`.
/// An explicit entry always overrides `all` for that root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    #[serde(default)]
    pub all: AccessLevel,
    #[serde(default)]
    pub roots: RootAccess,
}

impl Access {
    /// Explicit grant for `root`, if any.
    pub fn granted_to(&self, root: &ObjectId) -> Option<AccessLevel> {
        self.roots.anchors.get(root).copied()
    }
}
