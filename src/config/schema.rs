//! Configuration schema definitions.
//!
//! Every section derives Serde traits and carries defaults, so a minimal file
//! (or none at all) yields a runnable single-queue service.

use serde::{Deserialize, Serialize};

use crate::queue::QueueMode;
use crate::resilience::AttachRetry;

/// Root configuration for the request-queue service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP front door.
    pub listener: ListenerConfig,

    /// Identity of this process in the namespace.
    pub process: ProcessConfig,

    /// Queues hosted by the first generation.
    pub queues: QueueList,

    /// Config-managed delegations on the primary queue.
    pub delegations: Vec<DelegationConfig>,

    pub drain: DrainConfig,

    pub handoff: HandoffConfig,

    /// Retry policy for create/attach and delegation races.
    pub retry: AttachRetry,

    pub timeouts: TimeoutConfig,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Scheme stamped on queued request URLs ("http" or "https").
    pub scheme: String,

    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            scheme: "http".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub name: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            name: format!("request-queue-{}", std::process::id()),
        }
    }
}

/// One queue hosted by a server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    pub name: String,

    #[serde(default)]
    pub mode: QueueMode,

    /// URL prefixes bound to this queue (Controller only).
    #[serde(default)]
    pub prefixes: Vec<String>,

    /// Worker tasks dequeuing concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Let processes attached as Receiver change delegation on this queue.
    #[serde(default)]
    pub permit_receiver_delegation: bool,
}

fn default_workers() -> usize {
    4
}

impl QueueConfig {
    pub fn controller(name: impl Into<String>, prefixes: &[&str]) -> Self {
        Self {
            name: name.into(),
            mode: QueueMode::Controller,
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            workers: default_workers(),
            permit_receiver_delegation: false,
        }
    }

    pub fn receiver(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: QueueMode::Receiver,
            prefixes: Vec::new(),
            workers: default_workers(),
            permit_receiver_delegation: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Queue list whose default is one Controller queue on port 8080.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct QueueList(pub Vec<QueueConfig>);

impl Default for QueueList {
    fn default() -> Self {
        Self(vec![QueueConfig::controller("svc-v1", &["http://+:8080/"])])
    }
}

impl std::ops::Deref for QueueList {
    type Target = Vec<QueueConfig>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A delegation the daemon keeps installed on its primary queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DelegationConfig {
    pub queue_name: String,
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Upper bound on waiting for pending and in-flight requests.
    pub timeout_secs: u64,

    pub poll_interval_ms: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            poll_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// Generation N serves queue `<base>-v<N>`.
    pub base_queue_name: String,

    /// Workers per generation queue.
    pub workers: usize,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            base_queue_name: "svc".to_string(),
            workers: default_workers(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time until the worker replies) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
