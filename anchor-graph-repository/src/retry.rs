//! Bounded retry of whole transactions on transient store errors.
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::warn;

use crate::errors::StoreError;

const RETRY_BASE_DELAY_MS: u64 = 10;
const RETRY_MAX_DELAY_MS: u64 = 200;

/// Runs `operation` once, then up to `max_retries` more times while it fails
/// with a transient error.
///
/// `operation` receives the 1-based attempt number and must redo the whole
/// unit of work (open, write, commit). Non-transient errors and the error of
/// the last attempt are returned unchanged.
///
/// # Arguments
///
/// * `max_retries` - Additional attempts after the first one
/// * `operation` - Factory producing one attempt
///
/// # Returns
///
/// The first successful result, or the last error.
pub async fn with_transaction_retry<T, F, Fut>(
    max_retries: usize,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY_MS)
        .max_delay(Duration::from_millis(RETRY_MAX_DELAY_MS))
        .map(jitter)
        .take(max_retries);
    let attempts = AtomicUsize::new(0);

    RetryIf::start(
        strategy,
        || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            operation(attempt)
        },
        |error: &StoreError| {
            let attempt = attempts.load(Ordering::SeqCst);
            let retry = error.is_transient() && attempt <= max_retries;
            if retry {
                warn!(
                    attempt,
                    max = max_retries + 1,
                    error = %error,
                    "Transient transaction error, retrying"
                );
            }
            retry
        },
    )
    .await
}
