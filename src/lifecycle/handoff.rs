//! Generational handoff: replace the running server with a new one without
//! dropping or refusing requests.
//!
//! # Data Flow
//! ```text
//! handoff()
//!     → start generation N+1 (queue <base>-v<N+1>, no prefixes yet)
//!     → old primary delegates each owned prefix to the new queue
//!     → new group registers the same prefixes as standby
//!     → old primary's delegations are copied onto the new primary
//!     → secondary queues and their workers move to generation N+1
//!     → swap generations, then drain and shut down the old primary
//!         → old queue reclaimed, standbys promoted, delegations pruned
//! ```
//!
//! # Design Decisions
//! - Only the primary queue is versioned; secondary queues keep their names, so
//!   delegations that target them stay valid across generations
//! - A failed handoff drops the half-built generation; its reclaim prunes any
//!   delegation already pointing at it, so the old generation keeps serving
//! - Handoffs are serialized; readers never wait for a drain, and delegation
//!   retries release the generation lock between attempts

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::{DelegationConfig, QueueConfig, ServiceConfig};
use crate::delegation::{DelegationInfo, DelegationSummary, ServerDelegationProperty};
use crate::error::{QueueError, QueueResult};
use crate::kernel::{Namespace, ProcessId};
use crate::lifecycle::drain::{DrainPolicy, DrainReport};
use crate::resilience::{retry, AttachRetry};
use crate::routing::UrlPrefix;
use crate::server::{RequestHandler, Server, ServerStatus};

#[derive(Debug)]
struct Generation {
    number: u32,
    server: Server,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoffReport {
    pub generation: u32,
    pub from: String,
    pub to: String,
    pub prefixes: Vec<String>,
    /// Secondary queues now hosted by the new generation.
    pub carried: Vec<String>,
    pub drain: DrainReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub generation: u32,
    #[serde(flatten)]
    pub server: ServerStatus,
}

/// Hosts successive server generations inside one daemon.
pub struct Supervisor {
    namespace: Arc<dyn Namespace>,
    process: ProcessId,
    handler: Arc<dyn RequestHandler>,
    base_queue_name: String,
    workers: usize,
    drain: DrainPolicy,
    retry: AttachRetry,
    current: RwLock<Option<Generation>>,
    managed: Mutex<Vec<DelegationConfig>>,
    handoff_lock: Mutex<()>,
}

/// Generation number encoded in `<base>-v<N>`, if the name follows that form.
fn generation_of(base: &str, queue_name: &str) -> Option<u32> {
    queue_name.strip_prefix(base)?.strip_prefix("-v")?.parse().ok()
}

fn same_uri(a: &str, b: &str) -> bool {
    match (UrlPrefix::parse(a), UrlPrefix::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Managed delegations whose URI is absent from `desired`, compared as
/// normalized prefixes.
fn stale_delegations<'a>(managed: &'a [DelegationConfig], desired: &[DelegationConfig]) -> Vec<&'a DelegationConfig> {
    managed
        .iter()
        .filter(|m| !desired.iter().any(|d| same_uri(&d.uri, &m.uri)))
        .collect()
}

impl Supervisor {
    /// Start generation one from the configured queues and apply the
    /// config-managed delegations.
    pub async fn start(
        namespace: Arc<dyn Namespace>,
        config: &ServiceConfig,
        handler: Arc<dyn RequestHandler>,
    ) -> QueueResult<Self> {
        let process = ProcessId::new(config.process.name.clone());
        let drain = DrainPolicy::from(&config.drain);
        let server = Server::start(namespace.clone(), process.clone(), &config.queues, drain, handler.clone())?;
        let number = generation_of(&config.handoff.base_queue_name, server.primary_name()).unwrap_or(1);

        let supervisor = Self {
            namespace,
            process,
            handler,
            base_queue_name: config.handoff.base_queue_name.clone(),
            workers: config.handoff.workers,
            drain,
            retry: config.retry.clone(),
            current: RwLock::new(Some(Generation { number, server })),
            managed: Mutex::new(Vec::new()),
            handoff_lock: Mutex::new(()),
        };

        for (delegation, e) in supervisor.apply_delegations(&config.delegations).await {
            tracing::warn!(queue = %delegation.queue_name, uri = %delegation.uri, error = %e, "Configured delegation not applied");
        }
        Ok(supervisor)
    }

    pub fn namespace(&self) -> &Arc<dyn Namespace> {
        &self.namespace
    }

    pub fn process(&self) -> &ProcessId {
        &self.process
    }

    pub async fn status(&self) -> QueueResult<SupervisorStatus> {
        let current = self.current.read().await;
        let generation = current.as_ref().ok_or(QueueError::Closed)?;
        Ok(SupervisorStatus {
            generation: generation.number,
            server: generation.server.status(),
        })
    }

    pub async fn set_delegation(&self, queue_name: &str, uri: &str) -> QueueResult<DelegationSummary> {
        let current = self.current.read().await;
        let generation = current.as_ref().ok_or(QueueError::Closed)?;
        generation
            .server
            .set_delegation_property(queue_name, uri)
            .map(|wrapper| wrapper.summary())
    }

    pub async fn clear_delegation(&self, uri: &str) -> QueueResult<bool> {
        let current = self.current.read().await;
        let generation = current.as_ref().ok_or(QueueError::Closed)?;
        generation.server.clear_delegation(uri)
    }

    pub async fn delegations(&self) -> QueueResult<Vec<DelegationInfo>> {
        let current = self.current.read().await;
        let generation = current.as_ref().ok_or(QueueError::Closed)?;
        Ok(generation.server.delegations())
    }

    /// Reconcile config-managed delegations on the current primary: bindings
    /// dropped from config are cleared, the rest are (re)installed, retrying
    /// while a target queue does not exist yet. Returns the ones that failed.
    ///
    /// Concurrent reconciles run one at a time. The current generation is
    /// looked up again on every attempt, so a handoff or shutdown never waits
    /// out the backoff.
    pub async fn apply_delegations(&self, desired: &[DelegationConfig]) -> Vec<(DelegationConfig, QueueError)> {
        let mut managed = self.managed.lock().await;

        {
            let current = self.current.read().await;
            let Some(generation) = current.as_ref() else {
                return desired.iter().cloned().map(|d| (d, QueueError::Closed)).collect();
            };
            for stale in stale_delegations(&managed, desired) {
                if let Err(e) = generation.server.clear_delegation(&stale.uri) {
                    tracing::warn!(uri = %stale.uri, error = %e, "Failed to clear delegation removed from config");
                }
            }
        }

        let mut failed = Vec::new();
        let mut applied = Vec::new();
        for delegation in desired {
            let result = retry(&self.retry, "apply_delegation", || async move {
                let current = self.current.read().await;
                let generation = current.as_ref().ok_or(QueueError::Closed)?;
                generation
                    .server
                    .set_delegation_property(&delegation.queue_name, &delegation.uri)
                    .map(|_| ())
            })
            .await;
            match result {
                Ok(_) => applied.push(delegation.clone()),
                Err(e) => failed.push((delegation.clone(), e)),
            }
        }
        *managed = applied;
        failed
    }

    /// Move traffic to a new generation and retire the current one.
    pub async fn handoff(&self) -> QueueResult<HandoffReport> {
        let _serialized = self.handoff_lock.lock().await;

        let (old, report_prefixes, carried, next_number, next_name) = {
            let mut current = self.current.write().await;
            let generation = current.as_mut().ok_or(QueueError::Closed)?;
            let next_number = generation.number + 1;
            let next_name = format!("{}-v{}", self.base_queue_name, next_number);

            let mut next = Server::start(
                self.namespace.clone(),
                self.process.clone(),
                &[QueueConfig::controller(&next_name, &[]).with_workers(self.workers)],
                self.drain,
                self.handler.clone(),
            )?;

            let old_server = &mut generation.server;
            let inherited = old_server.delegations();
            let prefixes = old_server.owned_prefixes();
            for prefix in &prefixes {
                let uri = prefix.to_string();
                old_server.set_delegation_property(&next_name, &uri)?;
                next.add_prefix(&uri)?;
            }

            // Installed while still standby, so they apply the moment the
            // new primary is promoted.
            for delegation in inherited.iter().filter(|d| d.target != next_name) {
                let uri = delegation.uri.to_string();
                if let Err(e) = next.set_delegation_property(&delegation.target, &uri) {
                    tracing::warn!(target = %delegation.target, %uri, error = %e, "Delegation not carried over");
                }
            }

            let carried = old_server.secondary_names();
            next.adopt(old_server.take_secondaries());
            tracing::info!(
                from = old_server.primary_name(),
                to = %next_name,
                prefixes = prefixes.len(),
                ?carried,
                "Handoff: traffic delegated to new generation"
            );

            let old = current.replace(Generation {
                number: next_number,
                server: next,
            });
            (old, prefixes, carried, next_number, next_name)
        };

        let Some(old) = old else {
            return Err(QueueError::Closed);
        };
        let from = old.server.primary_name().to_string();
        let drain = old.server.shutdown().await;

        tracing::info!(generation = next_number, %from, to = %next_name, drained = drain.drained, "Handoff complete");
        Ok(HandoffReport {
            generation: next_number,
            from,
            to: next_name,
            prefixes: report_prefixes.iter().map(ToString::to_string).collect(),
            carried,
            drain,
        })
    }

    /// Drain and stop the current generation. Later calls return `None`.
    pub async fn shutdown(&self) -> Option<DrainReport> {
        let _serialized = self.handoff_lock.lock().await;
        let generation = self.current.write().await.take()?;
        Some(generation.server.shutdown().await)
    }
}
