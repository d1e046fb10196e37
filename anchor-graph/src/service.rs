//! Scheduler driver lifecycle.

use std::future::Future;
use std::sync::Arc;

use anchor_graph_engine::{Scheduler, SchedulerDriver};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::config::Dependencies;
use crate::errors::ServiceError;

/// Runs the scheduler driver until a shutdown signal arrives.
pub struct Service {
    scheduler: Arc<Scheduler>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Service {
    pub fn new(deps: &Dependencies) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            scheduler: Arc::clone(&deps.scheduler),
            shutdown_tx,
        }
    }

    /// Run until ctrl-c.
    pub async fn run(&self) -> Result<(), ServiceError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for ctrl-c");
            }
        })
        .await
    }

    /// Run until `signal` resolves, then stop the driver and wait for it.
    #[instrument(skip(self, signal))]
    pub async fn run_until<F>(&self, signal: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting anchor graph service");

        let driver = SchedulerDriver::new(Arc::clone(&self.scheduler));
        let shutdown_rx = self.shutdown_tx.subscribe();
        let driver_handle = tokio::spawn(async move { driver.run(shutdown_rx).await });

        signal.await;
        info!("Received shutdown signal");
        let _ = self.shutdown_tx.send(());

        driver_handle
            .await
            .map_err(|e| ServiceError::Driver(e.to_string()))?;
        info!("Anchor graph service stopped");
        Ok(())
    }
}
