//! The kernel-side request queue object.
//!
//! # Responsibilities
//! - Buffer accepted requests until a worker dequeues them
//! - Deliver each request to exactly one consumer
//! - Count open handles and reclaim on the last release
//! - Hold the delegation table consulted by the routing path
//!
//! # Design Decisions
//! - Buffer and handle count share one mutex so "last handle released" and
//!   "queue reclaimed" are decided atomically with respect to attach
//! - Waiters park on a `Notify`; enqueue wakes one, reclaim wakes all
//! - Delegation table is copy-on-write behind `ArcSwap`, read without locking

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};

use crate::delegation::binding::{BindingChange, DelegationBinding, DelegationTable};
use crate::error::{QueueError, QueueResult};
use crate::kernel::namespace::ProcessId;
use crate::kernel::request::QueuedRequest;
use crate::observability::metrics;
use crate::routing::UrlPrefix;

#[derive(Debug)]
struct QueueState {
    pending: VecDeque<QueuedRequest>,
    handles: usize,
    controller_open: bool,
    reclaimed: bool,
}

/// A named request queue as the namespace sees it.
#[derive(Debug)]
pub struct KernelQueue {
    name: String,
    owner: ProcessId,
    state: Mutex<QueueState>,
    available: Notify,
    delegations: ArcSwap<DelegationTable>,
    receivers_may_delegate: AtomicBool,
}

impl KernelQueue {
    /// A fresh queue holding the creator's Controller reference.
    pub fn new(name: impl Into<String>, owner: ProcessId) -> Self {
        Self {
            name: name.into(),
            owner,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                handles: 1,
                controller_open: true,
                reclaimed: false,
            }),
            available: Notify::new(),
            delegations: ArcSwap::from_pointee(DelegationTable::new()),
            receivers_may_delegate: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &ProcessId {
        &self.owner
    }

    pub fn is_reclaimed(&self) -> bool {
        self.state().reclaimed
    }

    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }

    pub fn handle_count(&self) -> usize {
        self.state().handles
    }

    pub fn controller_open(&self) -> bool {
        self.state().controller_open
    }

    /// Take an additional (Receiver) reference.
    pub(crate) fn attach(&self) -> QueueResult<()> {
        let mut state = self.state();
        if state.reclaimed {
            return Err(QueueError::NotFound(self.name.clone()));
        }
        state.handles += 1;
        Ok(())
    }

    /// Drop one reference. When it was the last one the queue is marked reclaimed
    /// and the still-buffered requests are handed back for abandonment.
    pub(crate) fn detach(&self, controller: bool) -> Option<Vec<QueuedRequest>> {
        let orphans = {
            let mut state = self.state();
            if state.reclaimed {
                return None;
            }
            state.handles = state.handles.saturating_sub(1);
            if controller {
                state.controller_open = false;
            }
            if state.handles > 0 {
                return None;
            }
            state.reclaimed = true;
            state.pending.drain(..).collect::<Vec<_>>()
        };
        self.available.notify_waiters();
        metrics::record_pending(&self.name, 0);
        Some(orphans)
    }

    /// Buffer a request. A reclaimed queue hands the request back.
    pub fn enqueue(&self, request: QueuedRequest) -> Result<(), QueuedRequest> {
        let depth = {
            let mut state = self.state();
            if state.reclaimed {
                return Err(request);
            }
            state.pending.push_back(request);
            state.pending.len()
        };
        self.available.notify_one();
        metrics::record_pending(&self.name, depth);
        Ok(())
    }

    /// Non-blocking dequeue.
    pub fn try_dequeue(&self) -> Option<QueuedRequest> {
        let (request, depth) = {
            let mut state = self.state();
            let request = state.pending.pop_front()?;
            (request, state.pending.len())
        };
        if depth > 0 {
            // Pass the wakeup on so parked workers keep draining.
            self.available.notify_one();
        }
        metrics::record_pending(&self.name, depth);
        Some(request)
    }

    /// Wait for the next request. Returns `Closed` once the queue is reclaimed or
    /// `handle_closed` flips to true (or its sender is dropped).
    pub async fn dequeue(&self, handle_closed: &mut watch::Receiver<bool>) -> QueueResult<QueuedRequest> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if *handle_closed.borrow() {
                return Err(QueueError::Closed);
            }
            if let Some(request) = self.try_dequeue() {
                return Ok(request);
            }
            if self.is_reclaimed() {
                return Err(QueueError::Closed);
            }

            tokio::select! {
                _ = &mut notified => {}
                changed = handle_closed.changed() => {
                    if changed.is_err() {
                        return Err(QueueError::Closed);
                    }
                }
            }
        }
    }

    /// Current delegation snapshot.
    pub fn delegations(&self) -> Arc<DelegationTable> {
        self.delegations.load_full()
    }

    pub(crate) fn install_delegation(&self, binding: DelegationBinding) -> BindingChange {
        let mut change = BindingChange::Unchanged;
        self.delegations.rcu(|table| {
            let mut next = DelegationTable::clone(table);
            change = next.insert(binding.clone());
            next
        });
        change
    }

    pub(crate) fn clear_delegation(&self, prefix: &UrlPrefix) -> bool {
        let mut removed = false;
        self.delegations.rcu(|table| {
            let mut next = DelegationTable::clone(table);
            removed = next.remove(prefix).is_some();
            next
        });
        removed
    }

    pub(crate) fn prune_delegations_to(&self, target: &str) -> usize {
        if !self.delegations.load().targets(target) {
            return 0;
        }
        let mut pruned = 0;
        self.delegations.rcu(|table| {
            let mut next = DelegationTable::clone(table);
            pruned = next.remove_target(target);
            next
        });
        pruned
    }

    pub(crate) fn clear_all_delegations(&self) {
        self.delegations.store(Arc::new(DelegationTable::new()));
    }

    pub fn receivers_may_delegate(&self) -> bool {
        self.receivers_may_delegate.load(Ordering::Acquire)
    }

    pub(crate) fn set_receivers_may_delegate(&self, allowed: bool) {
        self.receivers_may_delegate.store(allowed, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;

    fn request(path: &str) -> (QueuedRequest, tokio::sync::oneshot::Receiver<crate::kernel::QueueResponse>) {
        let url = Url::parse(&format!("http://localhost{}", path)).unwrap();
        QueuedRequest::new("GET", url, vec![], vec![])
    }

    #[test]
    fn test_handle_counting() {
        let q = KernelQueue::new("q", ProcessId::new("p"));
        assert_eq!(q.handle_count(), 1);
        q.attach().unwrap();
        assert_eq!(q.handle_count(), 2);

        assert!(q.detach(true).is_none());
        assert!(!q.controller_open());
        assert!(!q.is_reclaimed());

        assert!(q.detach(false).is_some());
        assert!(q.is_reclaimed());
        assert!(matches!(q.attach(), Err(QueueError::NotFound(_))));
    }

    #[test]
    fn test_fifo_and_reclaim_returns_orphans() {
        let q = KernelQueue::new("q", ProcessId::new("p"));
        let (a, _ra) = request("/a");
        let (b, _rb) = request("/b");
        q.enqueue(a).unwrap();
        q.enqueue(b).unwrap();
        assert_eq!(q.try_dequeue().unwrap().url().path(), "/a");

        let orphans = q.detach(true).unwrap();
        assert_eq!(orphans.len(), 1);
        let (c, _rc) = request("/c");
        assert!(q.enqueue(c).is_err());
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let q = Arc::new(KernelQueue::new("q", ProcessId::new("p")));
        let (_tx, mut closed) = watch::channel(false);

        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.dequeue(&mut closed).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let (r, _rx) = request("/x");
        q.enqueue(r).unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(got.unwrap().url().path(), "/x");
    }

    #[tokio::test]
    async fn test_dequeue_returns_closed_on_reclaim() {
        let q = Arc::new(KernelQueue::new("q", ProcessId::new("p")));
        let (_tx, mut closed) = watch::channel(false);
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.dequeue(&mut closed).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.detach(true);

        let res = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(res.unwrap_err(), QueueError::Closed);
    }

    #[tokio::test]
    async fn test_dequeue_returns_closed_on_handle_close() {
        let q = Arc::new(KernelQueue::new("q", ProcessId::new("p")));
        let (tx, mut closed) = watch::channel(false);
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.dequeue(&mut closed).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send_replace(true);

        let res = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(res.unwrap_err(), QueueError::Closed);
        assert!(!q.is_reclaimed());
    }

    #[tokio::test]
    async fn test_each_request_delivered_once() {
        let q = Arc::new(KernelQueue::new("q", ProcessId::new("p")));
        let (tx, _) = watch::channel(false);
        let total = 200;

        let mut workers = Vec::new();
        for _ in 0..8 {
            let q = q.clone();
            let mut closed = tx.subscribe();
            workers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Ok(req) = q.dequeue(&mut closed).await {
                    seen.push(req.id());
                }
                seen
            }));
        }

        let mut receivers = Vec::new();
        for i in 0..total {
            let (r, rx) = request(&format!("/{}", i));
            receivers.push(rx);
            q.enqueue(r).unwrap();
        }

        while q.pending_len() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send_replace(true);

        let mut all = Vec::new();
        for w in workers {
            all.extend(w.await.unwrap());
        }
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), total);
        assert_eq!(unique.len(), total);
    }
}
