//! A server: the queues one process hosts, their URL groups and workers.
//!
//! # Responsibilities
//! - Create or attach the configured queues and register their prefixes
//! - Run worker tasks against each queue
//! - Expose the delegation property on the primary queue
//! - Drain and release everything on shutdown
//!
//! # Design Decisions
//! - The primary queue is the first configured queue; delegation and prefix
//!   changes apply to it
//! - Each hosted queue tracks its own in-flight requests, so a secondary queue
//!   can move to the next generation together with its workers
//! - Wrappers returned by delegation calls are handed to the caller, never kept,
//!   so the server never pins a target queue

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::delegation::{DelegationInfo, RequestQueueWrapper, ServerDelegationProperty};
use crate::error::{QueueError, QueueResult};
use crate::kernel::{Namespace, ProcessId};
use crate::lifecycle::drain::{wait_for_drain, DrainPolicy, DrainReport, InFlightTracker};
use crate::queue::{QueueMode, RequestQueue, UrlGroup};
use crate::routing::UrlPrefix;
use crate::server::handler::RequestHandler;
use crate::server::worker::spawn_workers;

/// One queue with its URL group and workers.
#[derive(Debug)]
pub(crate) struct HostedQueue {
    queue: RequestQueue,
    group: Option<UrlGroup>,
    workers: Vec<JoinHandle<()>>,
    in_flight: InFlightTracker,
}

/// Snapshot for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub process: String,
    pub primary: String,
    pub queues: Vec<String>,
    pub prefixes: Vec<UrlPrefix>,
    pub delegations: Vec<DelegationInfo>,
    pub pending: usize,
    pub in_flight: u64,
}

#[derive(Debug)]
pub struct Server {
    namespace: Arc<dyn Namespace>,
    process: ProcessId,
    queues: Vec<HostedQueue>,
    drain: DrainPolicy,
}

impl Server {
    /// Set up every queue, then start workers. Nothing is left registered if
    /// any queue fails.
    pub fn start(
        namespace: Arc<dyn Namespace>,
        process: ProcessId,
        queues: &[QueueConfig],
        drain: DrainPolicy,
        handler: Arc<dyn RequestHandler>,
    ) -> QueueResult<Self> {
        if queues.is_empty() {
            return Err(QueueError::InvalidName("a server needs at least one queue".into()));
        }

        let mut hosted = Vec::with_capacity(queues.len());
        for config in queues {
            hosted.push(Self::open(&namespace, &process, config)?);
        }

        for (host, config) in hosted.iter_mut().zip(queues) {
            host.workers = spawn_workers(&host.queue.receiver(), config.workers, handler.clone(), &host.in_flight);
        }

        tracing::info!(
            process = %process,
            queues = ?queues.iter().map(|q| q.name.as_str()).collect::<Vec<_>>(),
            "Server started"
        );

        Ok(Self {
            namespace,
            process,
            queues: hosted,
            drain,
        })
    }

    fn open(namespace: &Arc<dyn Namespace>, process: &ProcessId, config: &QueueConfig) -> QueueResult<HostedQueue> {
        let queue = RequestQueue::create(namespace.clone(), process, &config.name, config.mode)?;

        let group = match &queue {
            RequestQueue::Controller(controller) => {
                controller.permit_receiver_delegation(config.permit_receiver_delegation);
                let group = UrlGroup::new(namespace.clone());
                controller.bind_url_group(&group)?;
                for prefix in &config.prefixes {
                    group.add_prefix(prefix)?;
                }
                Some(group)
            }
            RequestQueue::Receiver(_) => {
                if !config.prefixes.is_empty() {
                    return Err(QueueError::PermissionDenied(format!(
                        "receiver handle on '{}' cannot register prefixes",
                        config.name
                    )));
                }
                None
            }
        };

        tracing::info!(queue = %config.name, mode = %config.mode, prefixes = ?config.prefixes, "Queue ready");
        Ok(HostedQueue {
            queue,
            group,
            workers: Vec::new(),
            in_flight: InFlightTracker::new(),
        })
    }

    fn primary(&self) -> &HostedQueue {
        &self.queues[0]
    }

    pub fn process(&self) -> &ProcessId {
        &self.process
    }

    pub fn primary_name(&self) -> &str {
        self.primary().queue.name()
    }

    pub fn primary_mode(&self) -> QueueMode {
        self.primary().queue.mode()
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|h| h.queue.name().to_string()).collect()
    }

    /// Register another prefix on the primary queue's URL group. A prefix held
    /// by a queue that delegates it here is registered as standby.
    pub fn add_prefix(&self, uri: &str) -> QueueResult<UrlPrefix> {
        match &self.primary().group {
            Some(group) => group.add_prefix(uri),
            None => Err(QueueError::PermissionDenied(format!(
                "'{}' is attached as receiver and has no URL group",
                self.primary_name()
            ))),
        }
    }

    /// Prefixes the primary group holds, primary and standby.
    pub fn prefixes(&self) -> Vec<UrlPrefix> {
        self.primary().group.as_ref().map(UrlGroup::prefixes).unwrap_or_default()
    }

    /// Prefixes currently routed to the primary queue.
    pub fn owned_prefixes(&self) -> Vec<UrlPrefix> {
        self.namespace.owned_prefixes(self.primary_name())
    }

    pub fn clear_delegation(&self, uri: &str) -> QueueResult<bool> {
        self.primary().queue.clear_delegation(uri)
    }

    pub fn delegations(&self) -> Vec<DelegationInfo> {
        self.primary().queue.delegations()
    }

    /// Grant or revoke delegation rights for Receiver handles on the primary queue.
    pub fn permit_receiver_delegation(&self, allowed: bool) -> QueueResult<()> {
        match &self.primary().queue {
            RequestQueue::Controller(q) => {
                q.permit_receiver_delegation(allowed);
                Ok(())
            }
            RequestQueue::Receiver(q) => Err(QueueError::PermissionDenied(format!(
                "receiver handle on '{}' cannot grant delegation rights",
                q.name()
            ))),
        }
    }

    /// Requests buffered on this server's queues.
    pub fn pending(&self) -> usize {
        self.queues.iter().map(|h| h.queue.pending_len()).sum()
    }

    pub fn in_flight(&self) -> u64 {
        self.queues.iter().map(|h| h.in_flight.active_count()).sum()
    }

    /// Names of the queues after the primary.
    pub fn secondary_names(&self) -> Vec<String> {
        self.queues[1..].iter().map(|h| h.queue.name().to_string()).collect()
    }

    /// Detach every queue except the primary, workers included, so another
    /// server can keep serving them.
    pub(crate) fn take_secondaries(&mut self) -> Vec<HostedQueue> {
        self.queues.split_off(1)
    }

    /// Take over queues detached from a previous server.
    pub(crate) fn adopt(&mut self, queues: Vec<HostedQueue>) {
        for hosted in &queues {
            tracing::info!(process = %self.process, queue = hosted.queue.name(), "Queue carried over");
        }
        self.queues.extend(queues);
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            process: self.process.to_string(),
            primary: self.primary_name().to_string(),
            queues: self.queue_names(),
            prefixes: self.owned_prefixes(),
            delegations: self.delegations(),
            pending: self.pending(),
            in_flight: self.in_flight(),
        }
    }

    /// Wait for pending and in-flight requests to finish, bounded by the policy.
    pub async fn drain(&self) -> bool {
        wait_for_drain(&self.drain, || self.pending(), || self.in_flight()).await
    }

    /// Drain, close every handle, and wait for the workers to stop.
    pub async fn shutdown(self) -> DrainReport {
        let started = Instant::now();
        let queues = self.queue_names();
        tracing::info!(process = %self.process, ?queues, "Server draining");

        let drained = self.drain().await;
        let pending_at_close = self.pending();

        let mut workers = Vec::new();
        for hosted in self.queues {
            workers.extend(hosted.workers);
            hosted.queue.close();
            if let Some(group) = hosted.group {
                group.close();
            }
        }
        for result in join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task failed");
            }
        }

        let report = DrainReport {
            queues,
            drained,
            pending_at_close,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            drained = report.drained,
            pending_at_close = report.pending_at_close,
            elapsed_ms = report.elapsed_ms,
            "Server stopped"
        );
        report
    }
}

impl ServerDelegationProperty for Server {
    fn set_delegation_property(&self, queue_name: &str, uri: &str) -> QueueResult<RequestQueueWrapper> {
        self.primary().queue.set_delegation_property(queue_name, uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{deliver, InMemoryNamespace, QueueResponse, QueuedRequest};
    use crate::server::handler::EchoHandler;
    use std::time::Duration;
    use url::Url;

    fn ns() -> Arc<dyn Namespace> {
        Arc::new(InMemoryNamespace::new())
    }

    fn quick() -> DrainPolicy {
        DrainPolicy {
            timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(5),
        }
    }

    async fn send(ns: &Arc<dyn Namespace>, url: &str) -> QueueResponse {
        let (req, rx) = QueuedRequest::new("GET", Url::parse(url).unwrap(), vec![], vec![]);
        let _ = deliver(ns.as_ref(), req);
        tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_serves_requests() {
        let ns = ns();
        let server = Server::start(
            ns.clone(),
            ProcessId::new("a"),
            &[QueueConfig::controller("svc-v1", &["http://+:8080/"]).with_workers(2)],
            quick(),
            Arc::new(EchoHandler),
        )
        .unwrap();

        let resp = send(&ns, "http://h:8080/hello").await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("x-served-by"), Some("svc-v1"));

        let report = server.shutdown().await;
        assert!(report.drained);
        assert!(ns.lookup_queue("svc-v1").is_none());
        assert_eq!(send(&ns, "http://h:8080/hello").await.status, 404);
    }

    #[tokio::test]
    async fn test_failed_start_leaves_nothing_registered() {
        let ns = ns();
        let err = Server::start(
            ns.clone(),
            ProcessId::new("a"),
            &[
                QueueConfig::controller("one", &["http://+:8080/"]),
                QueueConfig::controller("two", &["http://+:8080/"]),
            ],
            quick(),
            Arc::new(EchoHandler),
        )
        .unwrap_err();
        assert!(matches!(err, QueueError::PrefixConflict(_)));
        assert!(ns.lookup_queue("one").is_none());
        assert!(ns.lookup_queue("two").is_none());
        assert!(ns.owned_prefixes("one").is_empty());
    }

    #[tokio::test]
    async fn test_receiver_primary_cannot_register() {
        let ns = ns();
        let owner = Server::start(
            ns.clone(),
            ProcessId::new("a"),
            &[QueueConfig::controller("shared", &["http://+:8080/"])],
            quick(),
            Arc::new(EchoHandler),
        )
        .unwrap();
        let helper = Server::start(
            ns.clone(),
            ProcessId::new("b"),
            &[QueueConfig::receiver("shared")],
            quick(),
            Arc::new(EchoHandler),
        )
        .unwrap();

        assert_eq!(helper.primary_mode(), QueueMode::Receiver);
        assert!(matches!(helper.add_prefix("http://+:9090/"), Err(QueueError::PermissionDenied(_))));
        assert!(matches!(helper.permit_receiver_delegation(true), Err(QueueError::PermissionDenied(_))));

        helper.shutdown().await;
        assert!(ns.lookup_queue("shared").is_some());
        owner.shutdown().await;
        assert!(ns.lookup_queue("shared").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_timeout_abandons_pending() {
        let ns = ns();
        let slow = |_: &str, _: &QueuedRequest| {
            std::thread::sleep(Duration::from_millis(200));
            QueueResponse::ok("late")
        };
        let server = Server::start(
            ns.clone(),
            ProcessId::new("a"),
            &[QueueConfig::controller("slow", &["http://+:8080/"]).with_workers(1)],
            DrainPolicy {
                timeout: Duration::from_millis(50),
                poll_interval: Duration::from_millis(5),
            },
            Arc::new(slow),
        )
        .unwrap();

        let mut replies = Vec::new();
        for _ in 0..3 {
            let (req, rx) = QueuedRequest::new("GET", Url::parse("http://h:8080/").unwrap(), vec![], vec![]);
            deliver(ns.as_ref(), req).unwrap();
            replies.push(rx);
        }

        let report = server.shutdown().await;
        assert!(!report.drained);

        let mut statuses = Vec::new();
        for rx in replies {
            statuses.push(rx.await.unwrap().status);
        }
        assert!(statuses.contains(&503));
        assert!(statuses.iter().all(|s| *s == 200 || *s == 503));
    }
}
