//! Metrics collection and exposition.
//!
//! # Metrics
//! - `queue_requests_routed_total` (counter): requests buffered on the owning queue
//! - `queue_requests_delegated_total` (counter): requests forwarded by a delegation
//! - `queue_requests_abandoned_total` (counter): requests answered 503 without a worker
//! - `queue_requests_dequeued_total` (counter): requests taken by workers
//! - `queue_pending_requests` (gauge): current queue depth

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape listener. Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_routed(queue: &str) {
    ::metrics::counter!("queue_requests_routed_total", "queue" => queue.to_string()).increment(1);
}

pub fn record_delegated(source: &str, target: &str) {
    ::metrics::counter!(
        "queue_requests_delegated_total",
        "queue" => source.to_string(),
        "target" => target.to_string()
    )
    .increment(1);
}

pub fn record_abandoned(queue: &str, count: usize) {
    if count > 0 {
        ::metrics::counter!("queue_requests_abandoned_total", "queue" => queue.to_string()).increment(count as u64);
    }
}

pub fn record_dequeued(queue: &str) {
    ::metrics::counter!("queue_requests_dequeued_total", "queue" => queue.to_string()).increment(1);
}

pub fn record_pending(queue: &str, depth: usize) {
    ::metrics::gauge!("queue_pending_requests", "queue" => queue.to_string()).set(depth as f64);
}
