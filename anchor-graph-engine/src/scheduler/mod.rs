//! Walker scheduling: immediate, deferred, asynchronous and recurring runs.
//!
//! Every scheduled run is a walker record whose status moves
//! PENDING → RUNNING → COMPLETED | FAILED. Claiming a record is a
//! compare-and-set on its status, so several drivers may share one store.
mod driver;
mod service;
mod trigger;
mod walker;

pub use driver::SchedulerDriver;
pub use service::{ClaimOutcome, Scheduler, TaskDefinition, TaskEvent};
pub use trigger::Trigger;
pub use walker::{Walker, WalkerContext, WalkerOutcome, WalkerRegistry};
