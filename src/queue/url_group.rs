//! URL groups: the set of prefixes that feed one queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::QueueResult;
use crate::kernel::{Namespace, UrlGroupId};
use crate::routing::UrlPrefix;

/// A handle to a URL group registered in the namespace.
///
/// An unbound group is removed (with its registrations) when dropped. Once bound,
/// its lifetime follows the queue: the registrations stay until the queue is
/// reclaimed or [`UrlGroup::close`] is called.
#[derive(Debug)]
pub struct UrlGroup {
    id: UrlGroupId,
    namespace: Arc<dyn Namespace>,
    bound: AtomicBool,
}

impl UrlGroup {
    pub fn new(namespace: Arc<dyn Namespace>) -> Self {
        let id = namespace.create_url_group();
        Self {
            id,
            namespace,
            bound: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> UrlGroupId {
        self.id
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    pub(crate) fn mark_bound(&self) {
        self.bound.store(true, Ordering::Release);
    }

    /// Validate, normalize and register a prefix. Re-adding is a no-op.
    pub fn add_prefix(&self, prefix: &str) -> QueueResult<UrlPrefix> {
        let prefix = UrlPrefix::parse(prefix)?;
        self.namespace.add_prefix(self.id, &prefix)?;
        Ok(prefix)
    }

    /// Unregister a prefix. Removing an absent prefix is not an error.
    pub fn remove_prefix(&self, prefix: &str) -> QueueResult<()> {
        let prefix = UrlPrefix::parse(prefix)?;
        self.namespace.remove_prefix(self.id, &prefix);
        Ok(())
    }

    pub fn prefixes(&self) -> Vec<UrlPrefix> {
        self.namespace.group_prefixes(self.id)
    }

    /// Explicitly unbind: remove the group and every registration it holds.
    pub fn close(self) {
        self.bound.store(false, Ordering::Release);
    }
}

impl Drop for UrlGroup {
    fn drop(&mut self) {
        if !self.is_bound() {
            self.namespace.remove_url_group(self.id);
        }
    }
}
