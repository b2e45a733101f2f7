//! The naming-service interface.
//!
//! Everything the queue layer needs from "the OS" goes through [`Namespace`]: the
//! object table that makes queue names discoverable, the URL-group bindings and the
//! global prefix registration table. Tests and the daemon use
//! [`InMemoryNamespace`](crate::kernel::InMemoryNamespace).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::delegation::binding::DelegationInfo;
use crate::error::QueueResult;
use crate::kernel::queue::KernelQueue;
use crate::queue::QueueMode;
use crate::routing::UrlPrefix;

static URL_GROUP_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a process using the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a URL group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UrlGroupId(u64);

impl UrlGroupId {
    /// Allocate a new unique id. Relaxed ordering: only uniqueness matters.
    pub fn next() -> Self {
        Self(URL_GROUP_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UrlGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "urlgroup-{}", self.0)
    }
}

/// Diagnostic snapshot of one queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub name: String,
    pub owner: ProcessId,
    pub handles: usize,
    pub controller_open: bool,
    pub pending: usize,
    pub prefixes: Vec<UrlPrefix>,
    pub standby_prefixes: Vec<UrlPrefix>,
    pub delegations: Vec<DelegationInfo>,
    pub receivers_may_delegate: bool,
}

/// OS-level object table, URL-group bindings and prefix registrations.
pub trait Namespace: Send + Sync + fmt::Debug {
    /// Create a queue and return it holding the caller's Controller reference.
    fn create_queue(&self, name: &str, process: &ProcessId) -> QueueResult<Arc<KernelQueue>>;

    /// Open an existing queue, taking a Receiver reference.
    fn open_queue(&self, name: &str, process: &ProcessId) -> QueueResult<Arc<KernelQueue>>;

    /// Release one reference taken by `create_queue` or `open_queue`.
    fn release_queue(&self, queue: &Arc<KernelQueue>, mode: QueueMode);

    fn lookup_queue(&self, name: &str) -> Option<Arc<KernelQueue>>;

    fn describe(&self) -> Vec<QueueInfo>;

    fn create_url_group(&self) -> UrlGroupId;

    /// Remove a group and all of its registrations. Idempotent.
    fn remove_url_group(&self, group: UrlGroupId);

    fn bind_url_group(&self, group: UrlGroupId, queue: &Arc<KernelQueue>) -> QueueResult<()>;

    fn bound_queue(&self, group: UrlGroupId) -> Option<Arc<KernelQueue>>;

    fn add_prefix(&self, group: UrlGroupId, prefix: &UrlPrefix) -> QueueResult<()>;

    /// Idempotent.
    fn remove_prefix(&self, group: UrlGroupId, prefix: &UrlPrefix);

    /// Prefixes the group holds, primary and standby.
    fn group_prefixes(&self, group: UrlGroupId) -> Vec<UrlPrefix>;

    /// Prefixes for which `queue` currently receives traffic (primary registrations).
    fn owned_prefixes(&self, queue: &str) -> Vec<UrlPrefix>;

    /// Prefixes `queue`'s groups hold, primary and standby.
    fn registered_prefixes(&self, queue: &str) -> Vec<UrlPrefix>;

    /// Queue owning the longest registered prefix matching `url`, before delegation.
    fn resolve(&self, url: &Url) -> Option<Arc<KernelQueue>>;
}
