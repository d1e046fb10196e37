//! Dependency initialization and wiring for the anchor graph service.

use std::env;
use std::sync::Arc;

use anchor_graph_engine::{EngineConfig, Registry, Scheduler, WalkerRegistry, registry};
use anchor_graph_repository::{DocumentStore, InMemoryStore, PostgresStore};
use tracing::{info, warn};

use crate::errors::ServiceError;

/// Default Postgres pool size.
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Which document store backs the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local store; contents are lost on exit.
    Memory,
    /// PostgreSQL with JSONB documents.
    Postgres,
}

impl StoreBackend {
    /// Parse the backend from the `STORE_BACKEND` environment variable.
    ///
    /// Valid values: "memory" or "postgres" (case-insensitive).
    /// Defaults to "memory" if not set or invalid.
    pub fn from_env() -> Self {
        match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" | "in-memory" => Self::Memory,
            "postgres" | "postgresql" => Self::Postgres,
            _ => {
                warn!("Invalid STORE_BACKEND, defaulting to 'memory'");
                Self::Memory
            }
        }
    }
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub store: Arc<dyn DocumentStore>,
    pub config: EngineConfig,
    /// Walkers available to the scheduler; register before running.
    pub walkers: Arc<WalkerRegistry>,
    pub scheduler: Arc<Scheduler>,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// Installs the store as the process-wide default and makes sure the
    /// system roots exist.
    ///
    /// # Environment Variables
    ///
    /// - `STORE_BACKEND`: "memory" or "postgres" (default: memory)
    /// - `DATABASE_URL`: Postgres connection string (required for postgres)
    /// - `DATABASE_MAX_CONNECTIONS`: Postgres pool size (default: 10)
    /// - Engine settings, see [`EngineConfig::from_env`]
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(ServiceError)` - If the store cannot be reached or bootstrapped
    pub async fn new() -> Result<Self, ServiceError> {
        let backend = StoreBackend::from_env();
        let config = EngineConfig::from_env();

        info!(
            backend = ?backend,
            max_transaction_retry = config.max_transaction_retry,
            scheduler_poll_interval_ms = config.scheduler_poll_interval.as_millis() as u64,
            "Initializing dependencies"
        );

        let store = Self::connect_store(backend).await?;
        Self::with_store(store, config).await
    }

    /// Wire the service around an existing store.
    pub async fn with_store(
        store: Arc<dyn DocumentStore>,
        config: EngineConfig,
    ) -> Result<Self, ServiceError> {
        registry::install(Arc::clone(&store));
        Registry::new(Arc::clone(&store))
            .ensure_system_roots(config.max_transaction_retry)
            .await?;

        let walkers = Arc::new(WalkerRegistry::new());
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&walkers),
            config.clone(),
        ));

        Ok(Self {
            store,
            config,
            walkers,
            scheduler,
        })
    }

    async fn connect_store(backend: StoreBackend) -> Result<Arc<dyn DocumentStore>, ServiceError> {
        match backend {
            StoreBackend::Memory => {
                warn!("Using the in-memory store; nothing survives a restart");
                Ok(Arc::new(InMemoryStore::new()))
            }
            StoreBackend::Postgres => {
                let database_url = env::var("DATABASE_URL")
                    .map_err(|_| ServiceError::config("DATABASE_URL must be set for postgres"))?;
                let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS);

                let store = PostgresStore::connect(&database_url, max_connections).await?;
                store.migrate().await?;
                info!("Postgres store connected and migrated");
                Ok(Arc::new(store))
            }
        }
    }
}
