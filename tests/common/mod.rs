//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use request_queue::config::QueueConfig;
use request_queue::kernel::{deliver, InMemoryNamespace, Namespace, ProcessId, QueueResponse, QueuedRequest};
use request_queue::lifecycle::DrainPolicy;
use request_queue::server::{EchoHandler, Server};
use url::Url;

pub fn namespace() -> Arc<dyn Namespace> {
    Arc::new(InMemoryNamespace::new())
}

pub fn fast_drain() -> DrainPolicy {
    DrainPolicy {
        timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(5),
    }
}

/// Start an echo server for `process` hosting a single Controller queue.
pub fn start_server(ns: &Arc<dyn Namespace>, process: &str, queue: &str, prefixes: &[&str]) -> Server {
    Server::start(
        ns.clone(),
        ProcessId::new(process),
        &[QueueConfig::controller(queue, prefixes).with_workers(2)],
        fast_drain(),
        Arc::new(EchoHandler),
    )
    .unwrap()
}

/// Deliver a GET for `url` and wait for the reply.
pub async fn send(ns: &Arc<dyn Namespace>, url: &str) -> QueueResponse {
    let (request, reply) = QueuedRequest::new("GET", Url::parse(url).unwrap(), vec![], vec![]);
    let _ = deliver(ns.as_ref(), request);
    tokio::time::timeout(Duration::from_secs(5), reply)
        .await
        .expect("reply timed out")
        .expect("reply channel dropped")
}

/// Name of the queue whose worker answered, or the status for errors.
pub fn served_by(response: &QueueResponse) -> String {
    response
        .header("x-served-by")
        .map(str::to_string)
        .unwrap_or_else(|| format!("status {}", response.status))
}
