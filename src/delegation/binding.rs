//! Delegation bindings and the per-queue binding table.
//!
//! # Design Decisions
//! - The table is a value: replacing a binding builds a new table and publishes it
//!   with one atomic pointer store, so the routing path sees either the old or the
//!   new binding set and never a mix
//! - Bindings to reclaimed queues are skipped at lookup time and pruned on reclaim

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::kernel::KernelQueue;
use crate::routing::UrlPrefix;

/// "Requests on `source` matching `prefix` go to `target`."
#[derive(Debug, Clone)]
pub struct DelegationBinding {
    source: String,
    target: Arc<KernelQueue>,
    prefix: UrlPrefix,
}

impl DelegationBinding {
    pub fn new(source: impl Into<String>, target: Arc<KernelQueue>, prefix: UrlPrefix) -> Self {
        Self {
            source: source.into(),
            target,
            prefix,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &Arc<KernelQueue> {
        &self.target
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    pub fn prefix(&self) -> &UrlPrefix {
        &self.prefix
    }

    pub fn is_live(&self) -> bool {
        !self.target.is_reclaimed()
    }

    fn same_target(&self, other: &DelegationBinding) -> bool {
        Arc::ptr_eq(&self.target, &other.target)
    }
}

/// Serializable view of a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelegationInfo {
    pub uri: UrlPrefix,
    pub target: String,
}

impl From<&DelegationBinding> for DelegationInfo {
    fn from(binding: &DelegationBinding) -> Self {
        Self {
            uri: binding.prefix.clone(),
            target: binding.target_name().to_string(),
        }
    }
}

/// Outcome of installing a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingChange {
    Added,
    Unchanged,
    Replaced { previous: String },
}

/// Delegation bindings of one source queue, keyed by URI.
#[derive(Debug, Clone, Default)]
pub struct DelegationTable {
    bindings: BTreeMap<UrlPrefix, DelegationBinding>,
}

impl DelegationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prefix: &UrlPrefix) -> Option<&DelegationBinding> {
        self.bindings.get(prefix)
    }

    /// Install or replace the binding for its prefix.
    pub fn insert(&mut self, binding: DelegationBinding) -> BindingChange {
        match self.bindings.insert(binding.prefix.clone(), binding.clone()) {
            None => BindingChange::Added,
            Some(prev) if prev.same_target(&binding) => BindingChange::Unchanged,
            Some(prev) => BindingChange::Replaced {
                previous: prev.target_name().to_string(),
            },
        }
    }

    pub fn remove(&mut self, prefix: &UrlPrefix) -> Option<DelegationBinding> {
        self.bindings.remove(prefix)
    }

    /// Drop every binding that points at `target`.
    pub fn remove_target(&mut self, target: &str) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|_, b| b.target_name() != target);
        before - self.bindings.len()
    }

    pub fn targets(&self, target: &str) -> bool {
        self.bindings.values().any(|b| b.target_name() == target)
    }

    /// Most specific live binding that covers `url`.
    pub fn resolve(&self, url: &Url) -> Option<&DelegationBinding> {
        self.bindings
            .values()
            .filter(|b| b.is_live() && b.prefix.matches(url))
            .max_by_key(|b| b.prefix.specificity())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DelegationBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
