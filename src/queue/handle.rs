//! Process-side queue handles.
//!
//! # Responsibilities
//! - Create (Controller) or attach to (Receiver) a named queue
//! - Release the handle exactly once, on every exit path
//! - Expose dequeue, URL-group binding and the delegation property
//!
//! # Design Decisions
//! - `QueueHandle<M>` is parameterized by the mode marker: binding URL groups and
//!   granting delegation rights exist only on `ControllerQueue`
//! - Release happens in `Drop`; `close(self)` consumes the handle, so a double
//!   release does not compile
//! - `RequestQueue` is the runtime-mode wrapper used by config-driven callers

use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::watch;

use crate::delegation::binding::DelegationInfo;
use crate::delegation::property::{self, RequestQueueWrapper};
use crate::error::{QueueError, QueueResult};
use crate::kernel::{KernelQueue, Namespace, ProcessId, QueuedRequest};
use crate::queue::mode::{Controller, Mode, QueueMode, Receiver};
use crate::queue::url_group::UrlGroup;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::retries::AttachRetry;

/// A process's handle on a request queue.
#[derive(Debug)]
pub struct QueueHandle<M: Mode> {
    kernel: Arc<KernelQueue>,
    namespace: Arc<dyn Namespace>,
    process: ProcessId,
    closed: watch::Sender<bool>,
    _mode: PhantomData<M>,
}

/// Owning handle.
pub type ControllerQueue = QueueHandle<Controller>;

/// Attached, non-owning handle.
pub type ReceiverQueue = QueueHandle<Receiver>;

impl<M: Mode> QueueHandle<M> {
    fn from_kernel(kernel: Arc<KernelQueue>, namespace: Arc<dyn Namespace>, process: &ProcessId) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            kernel,
            namespace,
            process: process.clone(),
            closed,
            _mode: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.kernel.name()
    }

    pub fn mode(&self) -> QueueMode {
        M::MODE
    }

    pub fn process(&self) -> &ProcessId {
        &self.process
    }

    pub(crate) fn kernel(&self) -> &Arc<KernelQueue> {
        &self.kernel
    }

    pub fn pending_len(&self) -> usize {
        self.kernel.pending_len()
    }

    /// A cloneable consumer for worker tasks. It reports `Closed` once this
    /// handle is closed, even if other handles keep the queue alive.
    pub fn receiver(&self) -> QueueReceiver {
        QueueReceiver {
            kernel: self.kernel.clone(),
            closed: self.closed.subscribe(),
        }
    }

    /// Wait for the next request.
    pub async fn dequeue(&self) -> QueueResult<QueuedRequest> {
        self.receiver().dequeue().await
    }

    /// Delegate requests matching `uri` to the queue named `queue_name`.
    pub fn set_delegation_property(&self, queue_name: &str, uri: &str) -> QueueResult<RequestQueueWrapper> {
        property::install(&self.namespace, &self.kernel, &self.process, M::MODE, queue_name, uri)
    }

    /// Remove the delegation for `uri`. Returns false if none was set.
    pub fn clear_delegation(&self, uri: &str) -> QueueResult<bool> {
        property::clear(&self.kernel, &self.process, M::MODE, uri)
    }

    pub fn delegations(&self) -> Vec<DelegationInfo> {
        self.kernel.delegations().iter().map(DelegationInfo::from).collect()
    }

    /// Release the handle.
    pub fn close(self) {}
}

impl QueueHandle<Controller> {
    /// Create a new named queue owned by `process`.
    pub fn create(namespace: Arc<dyn Namespace>, process: &ProcessId, name: &str) -> QueueResult<Self> {
        let kernel = namespace.create_queue(name, process)?;
        Ok(Self::from_kernel(kernel, namespace, process))
    }

    /// Route the group's prefixes to this queue.
    pub fn bind_url_group(&self, group: &UrlGroup) -> QueueResult<()> {
        self.namespace.bind_url_group(group.id(), &self.kernel)?;
        group.mark_bound();
        Ok(())
    }

    /// Allow processes attached as Receiver to configure delegation on this queue.
    pub fn permit_receiver_delegation(&self, allowed: bool) {
        self.kernel.set_receivers_may_delegate(allowed);
        tracing::info!(queue = self.name(), allowed, "Receiver delegation rights updated");
    }
}

impl QueueHandle<Receiver> {
    /// Attach to an existing queue by name.
    pub fn attach(namespace: Arc<dyn Namespace>, process: &ProcessId, name: &str) -> QueueResult<Self> {
        let kernel = namespace.open_queue(name, process)?;
        Ok(Self::from_kernel(kernel, namespace, process))
    }
}

impl<M: Mode> Drop for QueueHandle<M> {
    fn drop(&mut self) {
        self.closed.send_replace(true);
        self.namespace.release_queue(&self.kernel, M::MODE);
        tracing::debug!(queue = self.kernel.name(), process = %self.process, mode = %M::MODE, "Queue handle closed");
    }
}

/// Dequeue side of a handle, cloned into worker tasks.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    kernel: Arc<KernelQueue>,
    closed: watch::Receiver<bool>,
}

impl QueueReceiver {
    pub fn queue_name(&self) -> &str {
        self.kernel.name()
    }

    /// Blocks until a request arrives; `Closed` once the handle or queue closes.
    pub async fn dequeue(&mut self) -> QueueResult<QueuedRequest> {
        self.kernel.dequeue(&mut self.closed).await
    }
}

/// A handle whose mode is chosen at runtime.
#[derive(Debug)]
pub enum RequestQueue {
    Controller(ControllerQueue),
    Receiver(ReceiverQueue),
}

impl RequestQueue {
    pub fn create(
        namespace: Arc<dyn Namespace>,
        process: &ProcessId,
        name: &str,
        mode: QueueMode,
    ) -> QueueResult<Self> {
        match mode {
            QueueMode::Controller => ControllerQueue::create(namespace, process, name).map(Self::Controller),
            QueueMode::Receiver => ReceiverQueue::attach(namespace, process, name).map(Self::Receiver),
        }
    }

    /// Create the queue, or attach as Receiver if another process won the race.
    ///
    /// An attach that fails with `NotFound` means the winner already released the
    /// queue; creation is retried with backoff.
    pub async fn create_or_attach(
        namespace: Arc<dyn Namespace>,
        process: &ProcessId,
        name: &str,
        retry: &AttachRetry,
    ) -> QueueResult<Self> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match ControllerQueue::create(namespace.clone(), process, name) {
                Ok(queue) => return Ok(Self::Controller(queue)),
                Err(QueueError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
            match ReceiverQueue::attach(namespace.clone(), process, name) {
                Ok(queue) => return Ok(Self::Receiver(queue)),
                Err(QueueError::NotFound(_)) if attempt < retry.max_attempts => {
                    let delay = calculate_backoff(attempt, retry.base_delay_ms, retry.max_delay_ms);
                    tracing::debug!(queue = name, attempt, delay = ?delay, "Queue vanished between create and attach, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Controller(q) => q.name(),
            Self::Receiver(q) => q.name(),
        }
    }

    pub fn mode(&self) -> QueueMode {
        match self {
            Self::Controller(_) => QueueMode::Controller,
            Self::Receiver(_) => QueueMode::Receiver,
        }
    }

    pub fn pending_len(&self) -> usize {
        match self {
            Self::Controller(q) => q.pending_len(),
            Self::Receiver(q) => q.pending_len(),
        }
    }

    pub fn receiver(&self) -> QueueReceiver {
        match self {
            Self::Controller(q) => q.receiver(),
            Self::Receiver(q) => q.receiver(),
        }
    }

    pub async fn dequeue(&self) -> QueueResult<QueuedRequest> {
        self.receiver().dequeue().await
    }

    /// Only Controllers may bind URL groups.
    pub fn bind_url_group(&self, group: &UrlGroup) -> QueueResult<()> {
        match self {
            Self::Controller(q) => q.bind_url_group(group),
            Self::Receiver(q) => Err(QueueError::PermissionDenied(format!(
                "receiver handle on '{}' cannot bind URL groups",
                q.name()
            ))),
        }
    }

    pub fn set_delegation_property(&self, queue_name: &str, uri: &str) -> QueueResult<RequestQueueWrapper> {
        match self {
            Self::Controller(q) => q.set_delegation_property(queue_name, uri),
            Self::Receiver(q) => q.set_delegation_property(queue_name, uri),
        }
    }

    pub fn clear_delegation(&self, uri: &str) -> QueueResult<bool> {
        match self {
            Self::Controller(q) => q.clear_delegation(uri),
            Self::Receiver(q) => q.clear_delegation(uri),
        }
    }

    pub fn delegations(&self) -> Vec<DelegationInfo> {
        match self {
            Self::Controller(q) => q.delegations(),
            Self::Receiver(q) => q.delegations(),
        }
    }

    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::InMemoryNamespace;
    use std::time::Duration;
    use url::Url;

    fn ns() -> Arc<dyn Namespace> {
        Arc::new(InMemoryNamespace::new())
    }

    #[test]
    fn test_controller_close_leaves_nothing() {
        let ns = ns();
        let pid = ProcessId::new("a");
        let q = ControllerQueue::create(ns.clone(), &pid, "q").unwrap();
        q.close();
        assert!(ns.lookup_queue("q").is_none());
    }

    #[test]
    fn test_receiver_close_keeps_controller_queue() {
        let ns = ns();
        let q = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), "q").unwrap();
        let r = ReceiverQueue::attach(ns.clone(), &ProcessId::new("b"), "q").unwrap();
        assert_eq!(q.kernel().handle_count(), 2);
        r.close();
        assert!(ns.lookup_queue("q").is_some());
        assert_eq!(q.kernel().handle_count(), 1);
    }

    #[test]
    fn test_receiver_on_missing_queue() {
        let err = RequestQueue::create(ns(), &ProcessId::new("a"), "q1", QueueMode::Receiver).unwrap_err();
        assert_eq!(err, QueueError::NotFound("q1".into()));
    }

    #[test]
    fn test_receiver_cannot_bind_url_group() {
        let ns = ns();
        let _owner = RequestQueue::create(ns.clone(), &ProcessId::new("a"), "q", QueueMode::Controller).unwrap();
        let r = RequestQueue::create(ns.clone(), &ProcessId::new("b"), "q", QueueMode::Receiver).unwrap();
        let group = UrlGroup::new(ns);
        assert!(matches!(r.bind_url_group(&group), Err(QueueError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_create_or_attach() {
        let ns = ns();
        let retry = AttachRetry::default();
        let first = RequestQueue::create_or_attach(ns.clone(), &ProcessId::new("a"), "q", &retry).await.unwrap();
        let second = RequestQueue::create_or_attach(ns.clone(), &ProcessId::new("b"), "q", &retry).await.unwrap();
        assert_eq!(first.mode(), QueueMode::Controller);
        assert_eq!(second.mode(), QueueMode::Receiver);
    }

    #[tokio::test]
    async fn test_workers_stop_when_their_handle_closes() {
        let ns = ns();
        let q = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), "q").unwrap();
        let _r = ReceiverQueue::attach(ns.clone(), &ProcessId::new("b"), "q").unwrap();

        let mut rx = q.receiver();
        let worker = tokio::spawn(async move { rx.dequeue().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();

        let res = tokio::time::timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
        assert_eq!(res.unwrap_err(), QueueError::Closed);
        assert!(ns.lookup_queue("q").is_some());
    }

    #[tokio::test]
    async fn test_pending_requests_answered_on_last_close() {
        let ns = ns();
        let q = ControllerQueue::create(ns.clone(), &ProcessId::new("a"), "q").unwrap();
        let group = UrlGroup::new(ns.clone());
        q.bind_url_group(&group).unwrap();
        group.add_prefix("http://+:8080/").unwrap();

        let (req, rx) = QueuedRequest::new("GET", Url::parse("http://h:8080/").unwrap(), vec![], vec![]);
        crate::kernel::deliver(ns.as_ref(), req).unwrap();
        q.close();
        assert_eq!(rx.await.unwrap().status, 503);
        assert!(group.prefixes().is_empty());
    }
}
