//! Periodic scheduler loop.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use super::service::Scheduler;

/// Drives a [`Scheduler`] until shutdown.
///
/// Every tick it stores the next occurrence of each recurring definition,
/// starts every due PENDING record, and every `repopulate_every_ticks`
/// ticks re-queues RUNNING records left behind by a dead worker. Errors are
/// logged and never end the loop.
pub struct SchedulerDriver {
    scheduler: Arc<Scheduler>,
}

impl SchedulerDriver {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Ticks until a message arrives on `shutdown` or its sender is dropped.
    ///
    /// Runs already started are left to finish on their own.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.scheduler.config();
        info!(
            poll_interval_ms = config.scheduler_poll_interval.as_millis() as u64,
            repopulate_every_ticks = config.repopulate_every_ticks,
            "Starting scheduler driver"
        );

        let mut ticker = interval(config.scheduler_poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Scheduler driver shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(tick).await;
                    tick = tick.wrapping_add(1);
                }
            }
        }
    }

    /// One pass of the loop.
    ///
    /// # Returns
    ///
    /// Handles of the runs started by this pass.
    pub async fn tick(&self, tick: u64) -> Vec<JoinHandle<()>> {
        let now = Utc::now();
        let every = u64::from(self.scheduler.config().repopulate_every_ticks.max(1));

        if tick % every == 0 {
            if let Err(e) = self.scheduler.repopulate_tasks(now).await {
                error!(error = %e, "Failed to re-queue stale walkers");
            }
        }

        if let Err(e) = self.scheduler.ensure_occurrences(now).await {
            error!(error = %e, "Failed to store task occurrences");
        }

        let due = match self.scheduler.due_tasks(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to load due walkers");
                return Vec::new();
            }
        };
        if !due.is_empty() {
            debug!(count = due.len(), "Starting due walkers");
        }

        due.into_iter()
            .map(|id| {
                let scheduler = Arc::clone(&self.scheduler);
                tokio::spawn(async move { scheduler.run_logged(id).await })
            })
            .collect()
    }
}
