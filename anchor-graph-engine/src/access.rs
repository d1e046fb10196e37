//! Access evaluation and grant management.
//!
//! `effective_level` is pure and called before every read or write of an
//! anchor the acting root does not own. Grants may only be changed by the
//! owning root.
use anchor_graph_shared::{AccessLevel, Anchor, ObjectId, Reference, SUPER_ROOT_ID};
use tracing::{debug, instrument};

use crate::errors::GraphError;
use crate::memory::Memory;

/// True when `acting_root` owns `anchor`.
///
/// A root owns itself, and the super root owns every anchor without an owner.
pub fn is_owner(acting_root: &ObjectId, anchor: &Anchor) -> bool {
    if anchor.id == *acting_root {
        return true;
    }
    match anchor.root {
        Some(root) => root == *acting_root,
        None => *acting_root == SUPER_ROOT_ID,
    }
}

/// Level of access `acting_root` holds on `anchor`.
///
/// Ownership grants WRITE regardless of the access document. Otherwise an
/// explicit per-root grant wins over the `all` default.
pub fn effective_level(acting_root: &ObjectId, anchor: &Anchor) -> AccessLevel {
    if is_owner(acting_root, anchor) {
        return AccessLevel::Write;
    }
    anchor
        .access
        .granted_to(acting_root)
        .unwrap_or(anchor.access.all)
}

/// Whom a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grantee {
    /// Every root without an explicit grant.
    All,
    Root(ObjectId),
}

/// Outcome of a grant or revoke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessUpdate {
    /// Anchors whose access document changed.
    pub updated: usize,
    /// Reachable anchors left untouched because the caller does not own them.
    pub skipped: usize,
}

/// Grants `level` to `grantee` on `target`.
///
/// With `propagate`, the grant is also applied to every node and edge
/// reachable from `target` in the working set, including links not yet
/// committed. Nothing is changed unless the whole reachable set resolves.
/// Changes are queued in `memory` and persisted by the next commit.
///
/// # Returns
///
/// * `Ok(AccessUpdate)` - Counts of updated and skipped anchors
/// * `Err(GraphError::AccessDenied)` - The acting root does not own `target`
/// * `Err(GraphError::NotFound)` - `target` is absent or unreadable
/// * `Err(GraphError::InvalidSource)` - `propagate` is set and `target` is not a node or edge
pub async fn allow(
    memory: &mut Memory,
    target: &Reference,
    grantee: Grantee,
    level: AccessLevel,
    propagate: bool,
) -> Result<AccessUpdate, GraphError> {
    apply_grant(memory, target, propagate, |anchor| match grantee {
        Grantee::All => anchor.access.all = level,
        Grantee::Root(root) => {
            anchor.access.roots.anchors.insert(root, level);
        }
    })
    .await
}

/// Revokes the grant held by `grantee` on `target`.
///
/// Revoking `All` resets the default to NO_ACCESS; revoking a root removes
/// its explicit entry so the default applies again.
pub async fn disallow(
    memory: &mut Memory,
    target: &Reference,
    grantee: Grantee,
    propagate: bool,
) -> Result<AccessUpdate, GraphError> {
    apply_grant(memory, target, propagate, |anchor| match grantee {
        Grantee::All => anchor.access.all = AccessLevel::NoAccess,
        Grantee::Root(root) => {
            anchor.access.roots.anchors.remove(&root);
        }
    })
    .await
}

#[instrument(skip(memory, mutate), fields(root = %memory.root()))]
async fn apply_grant<F>(
    memory: &mut Memory,
    target: &Reference,
    propagate: bool,
    mutate: F,
) -> Result<AccessUpdate, GraphError>
where
    F: Fn(&mut Anchor),
{
    let acting_root = *memory.root();
    let anchor = memory.get(target).await?;
    if !is_owner(&acting_root, &anchor) {
        return Err(GraphError::access_denied(target));
    }

    let reached = if propagate {
        memory.reachable(target).await?
    } else {
        vec![anchor.reference()]
    };

    let mut update = AccessUpdate::default();
    let mut owned = Vec::with_capacity(reached.len());
    for reference in &reached {
        match memory.cached(&reference.id) {
            Some(anchor) if is_owner(&acting_root, anchor) => owned.push(reference.id),
            _ => update.skipped += 1,
        }
    }

    for id in &owned {
        memory.modify(id, &mutate)?;
    }
    update.updated = owned.len();

    debug!(updated = update.updated, skipped = update.skipped, "Access updated");
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_graph_shared::PUBLIC_ROOT_ID;
    use serde_json::Map;

    #[test]
    fn test_owner_always_has_write() {
        let owner = ObjectId::new();
        let mut anchor = Anchor::new_node(None, owner, Map::new());
        anchor.access.roots.anchors.insert(owner, AccessLevel::NoAccess);

        assert_eq!(effective_level(&owner, &anchor), AccessLevel::Write);
    }

    #[test]
    fn test_explicit_grant_overrides_all() {
        let owner = ObjectId::new();
        let other = ObjectId::new();
        let mut anchor = Anchor::new_node(None, owner, Map::new());
        anchor.access.all = AccessLevel::Read;

        assert_eq!(effective_level(&other, &anchor), AccessLevel::Read);
        anchor.access.roots.anchors.insert(other, AccessLevel::NoAccess);
        assert_eq!(effective_level(&other, &anchor), AccessLevel::NoAccess);
    }

    #[test]
    fn test_super_root_owns_system_anchors() {
        let public = Anchor::system_root(PUBLIC_ROOT_ID);
        let tenant = ObjectId::new();

        assert_eq!(effective_level(&SUPER_ROOT_ID, &public), AccessLevel::Write);
        assert_eq!(effective_level(&PUBLIC_ROOT_ID, &public), AccessLevel::Write);
        assert_eq!(effective_level(&tenant, &public), AccessLevel::NoAccess);
    }
}
