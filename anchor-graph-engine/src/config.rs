//! Engine tuning knobs.
use std::env;
use std::time::Duration;

use tracing::warn;

/// Default number of extra commit attempts after a transient failure.
pub const DEFAULT_MAX_TRANSACTION_RETRY: usize = 1;
/// Default pause between streamed traversal rounds.
pub const DEFAULT_TRAVERSAL_STREAM_DELAY_MS: u64 = 2000;
/// Default scheduler tick.
pub const DEFAULT_SCHEDULER_POLL_INTERVAL_MS: u64 = 1000;
/// Default age after which a RUNNING task is considered abandoned.
pub const DEFAULT_STALE_RUNNING_TIMEOUT_SECS: u64 = 300;
/// Default number of scheduler ticks between reconciliation passes.
pub const DEFAULT_REPOPULATE_EVERY_TICKS: u32 = 60;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_transaction_retry: usize,
    pub traversal_stream_delay: Duration,
    pub scheduler_poll_interval: Duration,
    pub stale_running_timeout: Duration,
    pub repopulate_every_ticks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transaction_retry: DEFAULT_MAX_TRANSACTION_RETRY,
            traversal_stream_delay: Duration::from_millis(DEFAULT_TRAVERSAL_STREAM_DELAY_MS),
            scheduler_poll_interval: Duration::from_millis(DEFAULT_SCHEDULER_POLL_INTERVAL_MS),
            stale_running_timeout: Duration::from_secs(DEFAULT_STALE_RUNNING_TIMEOUT_SECS),
            repopulate_every_ticks: DEFAULT_REPOPULATE_EVERY_TICKS,
        }
    }
}

impl EngineConfig {
    /// Reads the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MAX_TRANSACTION_RETRY`: extra commit attempts on transient errors (default: 1)
    /// - `TRAVERSAL_STREAM_DELAY_MS`: pause between streamed rounds (default: 2000)
    /// - `SCHEDULER_POLL_INTERVAL_MS`: scheduler tick (default: 1000)
    /// - `STALE_RUNNING_TIMEOUT_SECS`: age of an abandoned RUNNING task (default: 300)
    /// - `REPOPULATE_EVERY_TICKS`: ticks between reconciliation passes (default: 60)
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        Self {
            max_transaction_retry: env_or("MAX_TRANSACTION_RETRY", DEFAULT_MAX_TRANSACTION_RETRY),
            traversal_stream_delay: Duration::from_millis(env_or(
                "TRAVERSAL_STREAM_DELAY_MS",
                DEFAULT_TRAVERSAL_STREAM_DELAY_MS,
            )),
            scheduler_poll_interval: Duration::from_millis(env_or(
                "SCHEDULER_POLL_INTERVAL_MS",
                DEFAULT_SCHEDULER_POLL_INTERVAL_MS,
            )),
            stale_running_timeout: Duration::from_secs(env_or(
                "STALE_RUNNING_TIMEOUT_SECS",
                DEFAULT_STALE_RUNNING_TIMEOUT_SECS,
            )),
            repopulate_every_ticks: env_or("REPOPULATE_EVERY_TICKS", DEFAULT_REPOPULATE_EVERY_TICKS)
                .max(1),
        }
    }
}

fn env_or<T: std::str::FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, default = %default, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_transaction_retry, 1);
        assert_eq!(config.traversal_stream_delay, Duration::from_secs(2));
        assert_eq!(config.stale_running_timeout, Duration::from_secs(300));
    }
}
