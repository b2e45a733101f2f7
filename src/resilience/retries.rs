//! Bounded retries for operations that race another process.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueueResult;
use crate::resilience::backoff::calculate_backoff;

/// Retry policy for create/attach races and for delegating to a queue that a
/// peer process has not created yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachRetry {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for AttachRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 200,
        }
    }
}

impl AttachRetry {
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out of
/// attempts. Each attempt is a fresh future, so anything it locks is released
/// before the backoff sleep.
pub async fn retry<T, F, Fut>(policy: &AttachRetry, operation: &str, mut op: F) -> QueueResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = QueueResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                tracing::debug!(operation, attempt, delay = ?delay, error = %e, "Retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
