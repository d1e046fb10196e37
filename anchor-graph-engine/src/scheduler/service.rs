//! Walker submission, claiming and execution.
use std::sync::Arc;

use anchor_graph_repository::{DocumentStore, Filter, StoreError};
use anchor_graph_shared::types::dates::format_date;
use anchor_graph_shared::{AnchorKind, ObjectId, Reference, ScheduleStatus, WalkerRecord};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use super::trigger::Trigger;
use super::walker::{WalkerContext, WalkerOutcome, WalkerRegistry};
use crate::commit::commit;
use crate::config::EngineConfig;
use crate::errors::SchedulerError;
use crate::memory::Memory;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_HTTP_STATUS: u16 = 200;
const FAILED_HTTP_STATUS: u16 = 500;

/// A recurring or deferred run of a registered walker.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Unique definition name; seeds occurrence ids.
    pub name: String,
    /// Registered walker to run.
    pub walker: String,
    pub trigger: Trigger,
    /// Root the walker acts as.
    pub root: ObjectId,
    pub node: Option<ObjectId>,
    pub archetype: Map<String, Value>,
}

/// Published on every status transition of a walker record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEvent {
    pub walker_id: String,
    pub status: ScheduleStatus,
    pub http_status: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This worker claimed the record and ran it to the given status.
    Executed(ScheduleStatus),
    /// The record was absent or already claimed elsewhere.
    Skipped,
}

fn status_is(status: ScheduleStatus) -> Filter {
    Filter::eq(&["schedule", "status"], status.as_str())
}

/// Occurrence id of `definition` firing at `fire`; equal across workers.
fn occurrence_id(definition: &str, fire: &DateTime<Utc>) -> ObjectId {
    let seconds = u32::try_from(fire.timestamp()).unwrap_or(u32::MAX);
    let seed = format!("{definition}:{}", fire.timestamp_millis());
    ObjectId::from_parts(seconds, seed.as_bytes())
}

pub struct Scheduler {
    store: Arc<dyn DocumentStore>,
    walkers: Arc<WalkerRegistry>,
    definitions: RwLock<Vec<TaskDefinition>>,
    config: EngineConfig,
    events: broadcast::Sender<TaskEvent>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        walkers: Arc<WalkerRegistry>,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            walkers,
            definitions: RwLock::new(Vec::new()),
            config,
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn walkers(&self) -> &Arc<WalkerRegistry> {
        &self.walkers
    }

    /// Receives every status transition published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Status transitions as a stream, for transports that push them to
    /// clients.
    ///
    /// Events dropped because the consumer fell behind are skipped.
    pub fn event_stream(&self) -> impl Stream<Item = TaskEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| event.ok())
    }

    /// Adds a recurring definition, replacing one with the same name.
    ///
    /// # Returns
    ///
    /// * `Err(SchedulerError::UnknownWalker)` - `definition.walker` is not registered
    pub fn register_task(&self, definition: TaskDefinition) -> Result<(), SchedulerError> {
        if !self.walkers.contains(&definition.walker) {
            return Err(SchedulerError::UnknownWalker(definition.walker));
        }
        info!(
            task = %definition.name,
            walker = %definition.walker,
            "Registered task definition"
        );

        let mut definitions = self.definitions.write();
        definitions.retain(|existing| existing.name != definition.name);
        definitions.push(definition);
        Ok(())
    }

    pub fn definitions(&self) -> Vec<TaskDefinition> {
        self.definitions.read().clone()
    }

    /// Runs a walker in the caller's task and commits its working set.
    ///
    /// Nothing is written to the walker collection.
    pub async fn invoke(
        &self,
        name: &str,
        root: ObjectId,
        node: Option<Reference>,
        archetype: Map<String, Value>,
    ) -> Result<WalkerOutcome, SchedulerError> {
        let walker = self
            .walkers
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownWalker(name.to_string()))?;

        let memory = Memory::new(Arc::clone(&self.store), root);
        let mut ctx = WalkerContext::new(memory, archetype, node);
        walker.execute(&mut ctx).await?;

        let (mut memory, outcome) = ctx.into_parts();
        commit(&mut memory, &self.config).await?;
        Ok(outcome)
    }

    /// Persists a PENDING run of `name`, due at `execute_date`.
    ///
    /// # Returns
    ///
    /// The `w:<name>:<hex>` handle of the new walker record.
    pub async fn schedule_walker(
        &self,
        name: &str,
        root: ObjectId,
        node: Option<ObjectId>,
        archetype: Map<String, Value>,
        execute_date: DateTime<Utc>,
    ) -> Result<Reference, SchedulerError> {
        if !self.walkers.contains(name) {
            return Err(SchedulerError::UnknownWalker(name.to_string()));
        }

        let record = WalkerRecord::pending(ObjectId::new(), name, root, node, archetype, execute_date);
        self.store
            .insert_one(AnchorKind::Walker, &record.id, record.to_document()?)
            .await?;

        let reference = record.reference();
        debug!(walker = %reference, execute_date = %format_date(&execute_date), "Scheduled walker");
        Ok(reference)
    }

    /// Persists a run due now and starts it in the background.
    ///
    /// Returns as soon as the record is stored; progress is observable
    /// through [`Scheduler::get_task`] and [`Scheduler::subscribe`].
    pub async fn submit_async(
        self: &Arc<Self>,
        name: &str,
        root: ObjectId,
        node: Option<ObjectId>,
        archetype: Map<String, Value>,
    ) -> Result<Reference, SchedulerError> {
        let reference = self
            .schedule_walker(name, root, node, archetype, Utc::now())
            .await?;

        let scheduler = Arc::clone(self);
        let id = reference.id;
        tokio::spawn(async move { scheduler.run_logged(id).await });

        Ok(reference)
    }

    /// Deletes a walker record that has not been claimed yet.
    ///
    /// # Returns
    ///
    /// `Ok(true)` when a PENDING record was removed.
    pub async fn remove_scheduled_walker(&self, id: &ObjectId) -> Result<bool, SchedulerError> {
        let removed = self
            .store
            .delete_if(AnchorKind::Walker, id, &status_is(ScheduleStatus::Pending))
            .await?;
        Ok(removed)
    }

    pub async fn get_task(&self, id: &ObjectId) -> Result<Option<WalkerRecord>, SchedulerError> {
        match self.store.find_by_id(AnchorKind::Walker, id).await? {
            Some(document) => Ok(Some(WalkerRecord::from_document(document)?)),
            None => Ok(None),
        }
    }

    /// Makes sure the next occurrence of every definition is stored.
    ///
    /// Occurrence ids are deterministic, so concurrent workers race on the
    /// primary key and exactly one insert wins.
    ///
    /// # Returns
    ///
    /// Number of occurrences this call created.
    pub async fn ensure_occurrences(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let definitions = self.definitions();
        let mut created = 0;

        for definition in &definitions {
            let Some(fire) = definition.trigger.next_after(now) else {
                continue;
            };
            let record = WalkerRecord::pending(
                occurrence_id(&definition.name, &fire),
                definition.walker.as_str(),
                definition.root,
                definition.node,
                definition.archetype.clone(),
                fire,
            );

            match self
                .store
                .insert_one(AnchorKind::Walker, &record.id, record.to_document()?)
                .await
            {
                Ok(()) => {
                    created += 1;
                    debug!(task = %definition.name, fire = %format_date(&fire), "Stored occurrence");
                }
                Err(StoreError::DuplicateKey(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(created)
    }

    /// Ids of PENDING records due at or before `now`, oldest first.
    pub async fn due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<ObjectId>, SchedulerError> {
        let filter = Filter::And(vec![
            status_is(ScheduleStatus::Pending),
            Filter::lte(&["schedule", "execute_date"], format_date(&now)),
        ]);

        let mut due = Vec::new();
        for document in self.store.find(AnchorKind::Walker, &filter).await? {
            let record = WalkerRecord::from_document(document)?;
            if let Some(schedule) = record.schedule {
                due.push((schedule.execute_date, record.id));
            }
        }
        due.sort();
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    /// Claims and runs one walker record.
    ///
    /// The claim is a compare-and-set from PENDING to RUNNING, so a record
    /// runs at most once even when several workers see it due. Failures of
    /// the walker itself or of its commit are recorded on the record as
    /// FAILED; only errors reading or writing the record surface here.
    #[instrument(skip(self))]
    pub async fn run_task(&self, id: ObjectId) -> Result<ClaimOutcome, SchedulerError> {
        let Some(document) = self.store.find_by_id(AnchorKind::Walker, &id).await? else {
            debug!("Walker record is gone");
            return Ok(ClaimOutcome::Skipped);
        };
        let mut record = WalkerRecord::from_document(document)?;
        let Some(schedule) = record.schedule.as_mut() else {
            return Ok(ClaimOutcome::Skipped);
        };
        if schedule.status != ScheduleStatus::Pending {
            return Ok(ClaimOutcome::Skipped);
        }
        let root = schedule.root_id;
        let node = schedule.node_id.map(|node| Reference::node(None, node));

        schedule.status = ScheduleStatus::Running;
        schedule.executed_date = Some(Utc::now());
        let claimed = self
            .store
            .replace_if(
                AnchorKind::Walker,
                &id,
                &status_is(ScheduleStatus::Pending),
                record.to_document()?,
            )
            .await?;
        if !claimed {
            debug!("Walker record claimed elsewhere");
            return Ok(ClaimOutcome::Skipped);
        }
        self.publish(&record);

        let outcome = self
            .invoke(&record.name, root, node, record.archetype.clone())
            .await;
        let status = self.finish(&mut record, outcome);

        let stored = self
            .store
            .replace_if(
                AnchorKind::Walker,
                &id,
                &status_is(ScheduleStatus::Running),
                record.to_document()?,
            )
            .await?;
        if !stored {
            warn!("Walker record was re-queued while running; result discarded");
        }
        self.publish(&record);

        Ok(ClaimOutcome::Executed(status))
    }

    pub(crate) async fn run_logged(&self, id: ObjectId) {
        if let Err(e) = self.run_task(id).await {
            error!(error = %e, walker_id = %id, "Failed to run walker");
        }
    }

    fn finish(
        &self,
        record: &mut WalkerRecord,
        outcome: Result<WalkerOutcome, SchedulerError>,
    ) -> ScheduleStatus {
        let Some(schedule) = record.schedule.as_mut() else {
            return ScheduleStatus::Failed;
        };
        schedule.executed_date = Some(Utc::now());

        match outcome {
            Ok(outcome) => {
                record.archetype = outcome.archetype;
                schedule.status = ScheduleStatus::Completed;
                schedule.http_status = Some(outcome.http_status.unwrap_or(DEFAULT_HTTP_STATUS));
                schedule.reports = outcome.reports;
                schedule.custom = outcome.custom;
                schedule.error = None;
                info!(walker = %record.name, "Walker completed");
            }
            Err(e) => {
                schedule.status = ScheduleStatus::Failed;
                schedule.http_status = Some(FAILED_HTTP_STATUS);
                schedule.error = Some(e.to_string());
                error!(walker = %record.name, error = %e, "Walker failed");
            }
        }
        schedule.status
    }

    /// Puts RUNNING records claimed before `now - stale_running_timeout`
    /// back to PENDING.
    ///
    /// # Returns
    ///
    /// Number of records re-queued.
    #[instrument(skip(self))]
    pub async fn repopulate_tasks(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let Some(cutoff) = chrono::Duration::from_std(self.config.stale_running_timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
        else {
            return Ok(0);
        };

        let filter = Filter::And(vec![
            status_is(ScheduleStatus::Running),
            Filter::lte(&["schedule", "executed_date"], format_date(&cutoff)),
        ]);

        let mut requeued = 0;
        for document in self.store.find(AnchorKind::Walker, &filter).await? {
            let mut record = WalkerRecord::from_document(document)?;
            let Some(schedule) = record.schedule.as_mut() else {
                continue;
            };
            let Some(claimed_at) = schedule.executed_date.take() else {
                continue;
            };
            schedule.status = ScheduleStatus::Pending;

            let expected = Filter::And(vec![
                status_is(ScheduleStatus::Running),
                Filter::eq(&["schedule", "executed_date"], format_date(&claimed_at)),
            ]);
            if self
                .store
                .replace_if(AnchorKind::Walker, &record.id, &expected, record.to_document()?)
                .await?
            {
                requeued += 1;
                self.publish(&record);
            }
        }

        if requeued > 0 {
            warn!(requeued, "Re-queued stale walker records");
        }
        Ok(requeued)
    }

    fn publish(&self, record: &WalkerRecord) {
        let Some(schedule) = record.schedule.as_ref() else {
            return;
        };
        // No subscribers is not an error.
        let _ = self.events.send(TaskEvent {
            walker_id: record.reference().to_string(),
            status: schedule.status,
            http_status: schedule.http_status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_occurrence_id_is_deterministic() {
        let fire = Utc.with_ymd_and_hms(2024, 4, 23, 9, 5, 0).unwrap();

        assert_eq!(occurrence_id("cleanup", &fire), occurrence_id("cleanup", &fire));
        assert_ne!(occurrence_id("cleanup", &fire), occurrence_id("report", &fire));
        assert_eq!(occurrence_id("cleanup", &fire).timestamp(), fire.timestamp() as u32);
    }

    #[test]
    fn test_task_event_shape() {
        let event = TaskEvent {
            walker_id: "w:async_walker:000000000000000000000002".into(),
            status: ScheduleStatus::Completed,
            http_status: Some(200),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "walker_id": "w:async_walker:000000000000000000000002",
                "status": "COMPLETED",
                "http_status": 200
            })
        );
    }
}
