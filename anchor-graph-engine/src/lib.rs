//! # Anchor Graph Engine
//! This crate implements the anchor graph on top of a document store: the
//! identity registry, access evaluation and grants, the per-operation working
//! set with its atomic bulk commit, batch and streamed traversal, and the
//! walker scheduler.
pub mod access;
pub mod commit;
pub mod config;
pub mod errors;
pub mod memory;
pub mod registry;
pub mod scheduler;
pub mod traversal;

pub use access::{AccessUpdate, Grantee, allow, disallow, effective_level, is_owner};
pub use commit::{ChangeSet, CommitResult, commit};
pub use config::EngineConfig;
pub use errors::{GraphError, SchedulerError, WalkerError};
pub use memory::Memory;
pub use registry::Registry;
pub use scheduler::{
    ClaimOutcome, Scheduler, SchedulerDriver, TaskDefinition, TaskEvent, Trigger, Walker,
    WalkerContext, WalkerOutcome, WalkerRegistry,
};
pub use traversal::{
    EdgeRecord, NodeRecord, STREAM_MEDIA_TYPE, Traversal, TraversalQuery, TraversalResult,
    TraversalRound,
};
