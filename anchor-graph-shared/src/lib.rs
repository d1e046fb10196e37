//! # Anchor Graph Shared
//! This crate defines the data structures shared across the anchor graph
//! workspace: object ids and reference strings, anchors with their access
//! documents, and the persisted walker/task records.
pub mod types;

pub use types::{
    Access, AccessLevel, Anchor, AnchorKind, Links, ObjectId, Reference, ReferenceError, RootAccess,
    Schedule, ScheduleStatus, WalkerRecord, PUBLIC_ROOT_ID, SUPER_ROOT_ID,
};
