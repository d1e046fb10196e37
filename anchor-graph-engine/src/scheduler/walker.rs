//! Walker bodies and the context they run in.
use std::collections::HashMap;
use std::sync::Arc;

use anchor_graph_shared::{ObjectId, Reference};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::errors::WalkerError;
use crate::memory::Memory;

/// A named unit of graph logic run by the scheduler.
///
/// Implementors read and mutate the graph through `ctx.memory`; the
/// scheduler commits the working set after a successful run.
#[async_trait]
pub trait Walker: Send + Sync {
    /// Runs the walker body.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Working set, walker fields and result sinks for this run
    ///
    /// # Returns
    ///
    /// `Ok(())` marks the run COMPLETED; an error marks it FAILED.
    async fn execute(&self, ctx: &mut WalkerContext) -> Result<(), WalkerError>;
}

/// State handed to a walker for one run.
pub struct WalkerContext {
    /// Working set of the owning root.
    pub memory: Memory,
    /// Walker fields, written back to the walker record after the run.
    pub archetype: Map<String, Value>,
    /// Start node, if the run was bound to one.
    pub node: Option<Reference>,
    reports: Vec<Value>,
    http_status: Option<u16>,
    custom: Option<Value>,
}

impl WalkerContext {
    pub fn new(memory: Memory, archetype: Map<String, Value>, node: Option<Reference>) -> Self {
        Self {
            memory,
            archetype,
            node,
            reports: Vec::new(),
            http_status: None,
            custom: None,
        }
    }

    pub fn root(&self) -> &ObjectId {
        self.memory.root()
    }

    /// Appends a value to the run's ordered reports.
    pub fn report(&mut self, value: impl Into<Value>) {
        self.reports.push(value.into());
    }

    /// Overrides the status recorded for a successful run (200 by default).
    pub fn set_status(&mut self, http_status: u16) {
        self.http_status = Some(http_status);
    }

    pub fn set_custom(&mut self, value: impl Into<Value>) {
        self.custom = Some(value.into());
    }

    pub fn reports(&self) -> &[Value] {
        &self.reports
    }

    pub(crate) fn into_parts(self) -> (Memory, WalkerOutcome) {
        let outcome = WalkerOutcome {
            archetype: self.archetype,
            reports: self.reports,
            http_status: self.http_status,
            custom: self.custom,
        };
        (self.memory, outcome)
    }
}

/// What a run produced besides graph changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkerOutcome {
    pub archetype: Map<String, Value>,
    pub reports: Vec<Value>,
    pub http_status: Option<u16>,
    pub custom: Option<Value>,
}

/// Walkers by name.
#[derive(Default)]
pub struct WalkerRegistry {
    walkers: RwLock<HashMap<String, Arc<dyn Walker>>>,
}

impl WalkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `walker` under `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, walker: Arc<dyn Walker>) {
        self.walkers.write().insert(name.into(), walker);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Walker>> {
        self.walkers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.walkers.read().contains_key(name)
    }
}
