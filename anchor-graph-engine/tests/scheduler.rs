//! Integration tests for walker scheduling, claiming and reconciliation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anchor_graph_engine::{
    ClaimOutcome, EngineConfig, Registry, Scheduler, SchedulerDriver, SchedulerError,
    TaskDefinition, TaskEvent, Trigger, Walker, WalkerContext, WalkerError, WalkerRegistry,
};
use anchor_graph_repository::{DocumentStore, InMemoryStore};
use anchor_graph_shared::{AnchorKind, ObjectId, ScheduleStatus, WalkerRecord};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde_json::{Map, json};
use tokio::sync::broadcast;

/// Hangs a node named after `label` off the root and reports it.
struct PlantWalker;

#[async_trait]
impl Walker for PlantWalker {
    async fn execute(&self, ctx: &mut WalkerContext) -> Result<(), WalkerError> {
        let label = ctx
            .archetype
            .get("label")
            .and_then(|value| value.as_str())
            .unwrap_or("plant")
            .to_string();

        let root = ctx.memory.root_reference();
        let node = ctx.memory.create_node(Some(&label), Map::new());
        ctx.memory.connect(&root, &node, None, Map::new()).await?;

        ctx.report(json!({"planted": node.to_string()}));
        ctx.archetype.insert("visited".into(), json!(true));
        Ok(())
    }
}

struct FailingWalker;

#[async_trait]
impl Walker for FailingWalker {
    async fn execute(&self, ctx: &mut WalkerContext) -> Result<(), WalkerError> {
        ctx.report("about to fail");
        Err(WalkerError::failed("boom"))
    }
}

#[derive(Default)]
struct CountingWalker {
    runs: AtomicUsize,
}

#[async_trait]
impl Walker for CountingWalker {
    async fn execute(&self, ctx: &mut WalkerContext) -> Result<(), WalkerError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        ctx.set_status(202);
        ctx.set_custom(json!({"runs": self.runs.load(Ordering::SeqCst)}));
        Ok(())
    }
}

struct Harness {
    backend: InMemoryStore,
    store: Arc<dyn DocumentStore>,
    scheduler: Arc<Scheduler>,
    counter: Arc<CountingWalker>,
    root: ObjectId,
}

async fn harness() -> Harness {
    let backend = InMemoryStore::new();
    let store: Arc<dyn DocumentStore> = Arc::new(backend.clone());
    let registry = Registry::new(Arc::clone(&store));
    registry.ensure_system_roots(1).await.unwrap();
    let root = registry.create_user_root().await.unwrap().id;

    let counter = Arc::new(CountingWalker::default());
    let walkers = Arc::new(WalkerRegistry::new());
    walkers.register("plant", Arc::new(PlantWalker));
    walkers.register("failing", Arc::new(FailingWalker));
    walkers.register("counting", counter.clone());

    let config = EngineConfig {
        scheduler_poll_interval: Duration::from_millis(10),
        ..EngineConfig::default()
    };
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&store), walkers, config));

    Harness {
        backend,
        store,
        scheduler,
        counter,
        root,
    }
}

fn label(value: &str) -> Map<String, serde_json::Value> {
    let mut archetype = Map::new();
    archetype.insert("label".into(), json!(value));
    archetype
}

async fn wait_for_terminal(events: &mut broadcast::Receiver<TaskEvent>, walker_id: &str) -> TaskEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.walker_id == walker_id && event.status.is_terminal() {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_async_submission_completes_in_background() {
    let h = harness().await;
    let mut events = h.scheduler.subscribe();

    let handle = h
        .scheduler
        .submit_async("plant", h.root, None, label("Seed"))
        .await
        .unwrap();
    assert!(handle.to_string().starts_with("w:plant:"));

    let event = wait_for_terminal(&mut events, &handle.to_string()).await;
    assert_eq!(event.status, ScheduleStatus::Completed);
    assert_eq!(event.http_status, Some(200));

    let record = h.scheduler.get_task(&handle.id).await.unwrap().unwrap();
    let schedule = record.schedule.unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Completed);
    assert_eq!(schedule.http_status, Some(200));
    assert_eq!(schedule.reports.len(), 1);
    assert!(schedule.executed_date.is_some());
    assert_eq!(record.archetype["visited"], json!(true));

    // The walker's graph changes were committed.
    assert_eq!(h.backend.count(AnchorKind::Edge).await, 1);
    let planted = schedule.reports[0]["planted"].as_str().unwrap();
    assert!(Registry::new(h.store).resolve_str(planted).await.is_ok());
}

#[tokio::test]
async fn test_failing_walker_is_recorded_as_failed() {
    let h = harness().await;
    let handle = h
        .scheduler
        .schedule_walker("failing", h.root, None, Map::new(), Utc::now())
        .await
        .unwrap();

    let outcome = h.scheduler.run_task(handle.id).await.unwrap();
    assert_eq!(outcome, ClaimOutcome::Executed(ScheduleStatus::Failed));

    let schedule = h.scheduler.get_task(&handle.id).await.unwrap().unwrap().schedule.unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Failed);
    assert_eq!(schedule.http_status, Some(500));
    assert!(schedule.error.unwrap().contains("boom"));
}

#[tokio::test]
async fn test_unknown_walkers() {
    let h = harness().await;

    assert!(matches!(
        h.scheduler
            .schedule_walker("ghost", h.root, None, Map::new(), Utc::now())
            .await,
        Err(SchedulerError::UnknownWalker(_))
    ));

    // A stored record naming a walker this process does not know fails its run.
    let record = WalkerRecord::pending(ObjectId::new(), "ghost", h.root, None, Map::new(), Utc::now());
    h.store
        .insert_one(AnchorKind::Walker, &record.id, record.to_document().unwrap())
        .await
        .unwrap();

    let outcome = h.scheduler.run_task(record.id).await.unwrap();
    assert_eq!(outcome, ClaimOutcome::Executed(ScheduleStatus::Failed));
    let schedule = h.scheduler.get_task(&record.id).await.unwrap().unwrap().schedule.unwrap();
    assert!(schedule.error.unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_a_record_runs_once_under_concurrent_claims() {
    let h = harness().await;
    let handle = h
        .scheduler
        .schedule_walker("counting", h.root, None, Map::new(), Utc::now())
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        h.scheduler.run_task(handle.id),
        h.scheduler.run_task(handle.id)
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| **outcome == ClaimOutcome::Skipped)
            .count(),
        1
    );
    assert!(outcomes.contains(&ClaimOutcome::Executed(ScheduleStatus::Completed)));
    assert_eq!(h.counter.runs.load(Ordering::SeqCst), 1);

    let schedule = h.scheduler.get_task(&handle.id).await.unwrap().unwrap().schedule.unwrap();
    assert_eq!(schedule.http_status, Some(202));
    assert_eq!(schedule.custom, Some(json!({"runs": 1})));
}

#[tokio::test]
async fn test_event_stream_follows_status_transitions() {
    let h = harness().await;
    let mut stream = Box::pin(h.scheduler.event_stream());
    let handle = h
        .scheduler
        .schedule_walker("counting", h.root, None, Map::new(), Utc::now())
        .await
        .unwrap();

    h.scheduler.run_task(handle.id).await.unwrap();

    let running = stream.next().await.unwrap();
    let completed = stream.next().await.unwrap();
    assert_eq!(running.walker_id, handle.to_string());
    assert_eq!(running.status, ScheduleStatus::Running);
    assert_eq!(running.http_status, None);
    assert_eq!(completed.status, ScheduleStatus::Completed);
    assert_eq!(completed.http_status, Some(202));
}

#[tokio::test]
async fn test_only_due_records_are_selected() {
    let h = harness().await;
    let now = Utc::now();
    let past = h
        .scheduler
        .schedule_walker("counting", h.root, None, Map::new(), now - chrono::Duration::minutes(5))
        .await
        .unwrap();
    let future = h
        .scheduler
        .schedule_walker("counting", h.root, None, Map::new(), now + chrono::Duration::minutes(5))
        .await
        .unwrap();

    let due = h.scheduler.due_tasks(now).await.unwrap();
    assert_eq!(due, vec![past.id]);

    assert!(h.scheduler.remove_scheduled_walker(&future.id).await.unwrap());
    assert!(h.scheduler.get_task(&future.id).await.unwrap().is_none());

    h.scheduler.run_task(past.id).await.unwrap();
    assert!(!h.scheduler.remove_scheduled_walker(&past.id).await.unwrap());
}

#[tokio::test]
async fn test_recurring_occurrences_are_stored_once() {
    let h = harness().await;
    let definition = TaskDefinition {
        name: "heartbeat".into(),
        walker: "counting".into(),
        trigger: Trigger::interval(Duration::from_secs(60)).unwrap(),
        root: h.root,
        node: None,
        archetype: Map::new(),
    };
    h.scheduler.register_task(definition.clone()).unwrap();

    // A second worker sharing the store with the same definition.
    let walkers = h.scheduler.walkers().clone();
    let peer = Scheduler::new(Arc::clone(&h.store), walkers, EngineConfig::default());
    peer.register_task(definition).unwrap();

    let now = Utc::now();
    assert_eq!(h.scheduler.ensure_occurrences(now).await.unwrap(), 1);
    assert_eq!(h.scheduler.ensure_occurrences(now).await.unwrap(), 0);
    assert_eq!(peer.ensure_occurrences(now).await.unwrap(), 0);
    assert_eq!(h.backend.count(AnchorKind::Walker).await, 1);

    let stored = WalkerRecord::from_document(h.backend.documents(AnchorKind::Walker).await.remove(0))
        .unwrap();
    assert_eq!(stored.name, "counting");
    assert!(stored.schedule.unwrap().execute_date > now);
}

#[tokio::test]
async fn test_task_definitions_need_known_walkers() {
    let h = harness().await;
    let result = h.scheduler.register_task(TaskDefinition {
        name: "nightly".into(),
        walker: "ghost".into(),
        trigger: Trigger::cron("0 0 3 * * *").unwrap(),
        root: h.root,
        node: None,
        archetype: Map::new(),
    });
    assert!(matches!(result, Err(SchedulerError::UnknownWalker(_))));
}

#[tokio::test]
async fn test_stale_running_records_are_requeued() {
    let h = harness().await;
    let now = Utc::now();

    let mut stale = WalkerRecord::pending(ObjectId::new(), "counting", h.root, None, Map::new(), now);
    let mut fresh = stale.clone();
    fresh.id = ObjectId::new();
    if let Some(schedule) = stale.schedule.as_mut() {
        schedule.status = ScheduleStatus::Running;
        schedule.executed_date = Some(now - chrono::Duration::minutes(10));
    }
    if let Some(schedule) = fresh.schedule.as_mut() {
        schedule.status = ScheduleStatus::Running;
        schedule.executed_date = Some(now);
    }
    for record in [&stale, &fresh] {
        h.store
            .insert_one(AnchorKind::Walker, &record.id, record.to_document().unwrap())
            .await
            .unwrap();
    }

    assert_eq!(h.scheduler.repopulate_tasks(now).await.unwrap(), 1);

    let requeued = h.scheduler.get_task(&stale.id).await.unwrap().unwrap();
    assert_eq!(requeued.status(), Some(ScheduleStatus::Pending));
    let untouched = h.scheduler.get_task(&fresh.id).await.unwrap().unwrap();
    assert_eq!(untouched.status(), Some(ScheduleStatus::Running));

    // The re-queued record is due again and runs normally.
    assert_eq!(
        h.scheduler.run_task(stale.id).await.unwrap(),
        ClaimOutcome::Executed(ScheduleStatus::Completed)
    );
}

#[tokio::test]
async fn test_invoke_runs_without_a_record() {
    let h = harness().await;

    let outcome = h
        .scheduler
        .invoke("plant", h.root, None, label("Direct"))
        .await
        .unwrap();

    assert_eq!(outcome.reports.len(), 1);
    assert_eq!(outcome.archetype["visited"], json!(true));
    assert_eq!(h.backend.count(AnchorKind::Walker).await, 0);
    assert_eq!(h.backend.count(AnchorKind::Edge).await, 1);
}

#[tokio::test]
async fn test_driver_tick_starts_due_records() {
    let h = harness().await;
    let handle = h
        .scheduler
        .schedule_walker("counting", h.root, None, Map::new(), Utc::now())
        .await
        .unwrap();

    let driver = SchedulerDriver::new(Arc::clone(&h.scheduler));
    let started = driver.tick(1).await;
    assert_eq!(started.len(), 1);
    for run in started {
        run.await.unwrap();
    }

    let record = h.scheduler.get_task(&handle.id).await.unwrap().unwrap();
    assert_eq!(record.status(), Some(ScheduleStatus::Completed));
}

#[tokio::test]
async fn test_driver_runs_until_shutdown() {
    let h = harness().await;
    let mut events = h.scheduler.subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let driver = SchedulerDriver::new(Arc::clone(&h.scheduler));
    let running = tokio::spawn(async move { driver.run(shutdown_rx).await });

    let handle = h
        .scheduler
        .schedule_walker("plant", h.root, None, label("Tick"), Utc::now())
        .await
        .unwrap();
    let event = wait_for_terminal(&mut events, &handle.to_string()).await;
    assert_eq!(event.status, ScheduleStatus::Completed);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
}
