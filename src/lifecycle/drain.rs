//! Drain tracking: in-flight handler invocations and the bounded wait for a
//! queue to empty before its handle is closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::DrainConfig;

/// Counts requests a worker has dequeued but not yet answered.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&DrainConfig> for DrainPolicy {
    fn from(config: &DrainConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self::from(&DrainConfig::default())
    }
}

/// Outcome of shutting a server down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub queues: Vec<String>,
    /// False when the timeout expired with work left.
    pub drained: bool,
    /// Requests still buffered when the handles were closed.
    pub pending_at_close: usize,
    pub elapsed_ms: u64,
}

/// Poll until `pending()` and `in_flight()` both read zero, or the policy's
/// timeout expires. Returns whether the drain completed.
pub async fn wait_for_drain(
    policy: &DrainPolicy,
    pending: impl Fn() -> usize,
    in_flight: impl Fn() -> u64,
) -> bool {
    let started = Instant::now();
    loop {
        let queued = pending();
        let active = in_flight();
        if queued == 0 && active == 0 {
            return true;
        }
        if started.elapsed() >= policy.timeout {
            tracing::warn!(pending = queued, in_flight = active, "Drain timed out");
            return false;
        }
        tracing::debug!(pending = queued, in_flight = active, "Draining");
        tokio::time::sleep(policy.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fast(timeout_ms: u64) -> DrainPolicy {
        DrainPolicy {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_tracker_counts() {
        let tracker = InFlightTracker::new();
        let g1 = tracker.track();
        let g2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        drop(g1);
        drop(g2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight() {
        let tracker = InFlightTracker::new();
        let guard = tracker.track();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
        });
        assert!(wait_for_drain(&fast(1000), || 0, || tracker.active_count()).await);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let tracker = InFlightTracker::new();
        let pending = AtomicUsize::new(3);
        let started = Instant::now();
        assert!(!wait_for_drain(&fast(50), || pending.load(Ordering::SeqCst), || tracker.active_count()).await);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = DrainPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.poll_interval, Duration::from_millis(100));
    }
}
