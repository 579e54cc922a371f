//! Bounded retry with exponential backoff
//!
//! Used for storage operations that can hit transient write conflicts
//! (e.g. cluster reassignment racing a categorization job). Retries are
//! bounded; once exhausted the last error propagates to the caller.

use std::time::Duration;

use tracing::{debug, warn};

use crate::storage::StorageError;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (beyond the first try)
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Delay before a given attempt (attempt 0 = first try, no delay)
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let exponential = self.base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
            exponential.min(self.max_delay_ms)
        };
        Duration::from_millis(delay_ms)
    }
}

/// Run a storage operation, retrying on transient write conflicts.
///
/// Non-conflict errors propagate immediately. Conflict errors are retried
/// up to `config.max_retries` times with exponential backoff, then the last
/// conflict error is returned.
pub fn retry_on_conflict<T, F>(config: &RetryConfig, mut operation: F) -> Result<T, StorageError>
where
    F: FnMut() -> Result<T, StorageError>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = config.calculate_delay(attempt);
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after write conflict"
            );
            std::thread::sleep(delay);
        }

        match operation() {
            Ok(result) => return Ok(result),
            Err(StorageError::WriteConflict(msg)) => {
                warn!(attempt, max_retries = config.max_retries, %msg, "write conflict");
                last_error = Some(StorageError::WriteConflict(msg));
            }
            Err(other) => return Err(other),
        }
    }

    Err(last_error.unwrap_or_else(|| StorageError::WriteConflict("retries exhausted".into())))
}
