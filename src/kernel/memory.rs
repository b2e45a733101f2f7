//! In-process namespace implementation.
//!
//! # Responsibilities
//! - Object table keyed by name (queues and foreign kernel objects)
//! - URL group → queue bindings
//! - Global prefix registrations with primary/standby ordering
//! - Reclaim of queues whose last handle is released
//!
//! # Design Decisions
//! - `DashMap` entry API decides creation races: exactly one creator wins
//! - Prefix table is copy-on-write behind `ArcSwap`; writers serialize on a mutex,
//!   the routing path only does an atomic load
//! - Reclaim removes registrations (promoting standbys) before dropping the
//!   queue's own delegation table, so a delegating queue keeps forwarding until the
//!   standby owns the prefix

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use url::Url;

use crate::delegation::binding::DelegationInfo;
use crate::error::{QueueError, QueueResult};
use crate::kernel::namespace::{Namespace, ProcessId, QueueInfo, UrlGroupId};
use crate::kernel::queue::KernelQueue;
use crate::kernel::request::QueuedRequest;
use crate::observability::metrics;
use crate::queue::QueueMode;
use crate::routing::{PrefixTable, UrlPrefix};

#[derive(Debug, Clone)]
enum KernelObject {
    Queue(Arc<KernelQueue>),
    Foreign { kind: String },
}

/// Namespace shared by every "process" living in this address space.
#[derive(Debug, Default)]
pub struct InMemoryNamespace {
    objects: DashMap<String, KernelObject>,
    groups: DashMap<UrlGroupId, Option<Arc<KernelQueue>>>,
    registrations: ArcSwap<PrefixTable<UrlGroupId>>,
    registration_lock: Mutex<()>,
    denied_creators: DashSet<ProcessId>,
}

impl InMemoryNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke the right of `process` to create request queues.
    pub fn deny_create_for(&self, process: ProcessId) {
        self.denied_creators.insert(process);
    }

    /// Place a non-queue object (event, mutex, section...) under `name`.
    pub fn insert_foreign_object(&self, name: &str, kind: &str) -> QueueResult<()> {
        match self.objects.entry(name.to_string()) {
            Entry::Occupied(_) => Err(QueueError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(KernelObject::Foreign {
                    kind: kind.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Apply `f` to a private copy of the prefix table and publish it if `f`
    /// reports a change. Nothing is published on error.
    fn update_registrations(
        &self,
        f: impl FnOnce(&mut PrefixTable<UrlGroupId>) -> QueueResult<bool>,
    ) -> QueueResult<bool> {
        let _guard = self.registration_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = PrefixTable::clone(&self.registrations.load());
        let changed = f(&mut next)?;
        if changed {
            self.registrations.store(Arc::new(next));
        }
        Ok(changed)
    }

    fn groups_bound_to(&self, queue: &Arc<KernelQueue>) -> Vec<UrlGroupId> {
        self.groups
            .iter()
            .filter(|entry| entry.value().as_ref().is_some_and(|q| Arc::ptr_eq(q, queue)))
            .map(|entry| *entry.key())
            .collect()
    }

    fn all_queues(&self) -> Vec<Arc<KernelQueue>> {
        self.objects
            .iter()
            .filter_map(|entry| match entry.value() {
                KernelObject::Queue(q) => Some(q.clone()),
                KernelObject::Foreign { .. } => None,
            })
            .collect()
    }

    fn reclaim(&self, queue: &Arc<KernelQueue>, orphans: Vec<QueuedRequest>) {
        let name = queue.name().to_string();

        let groups = self.groups_bound_to(queue);
        if !groups.is_empty() {
            let _ = self.update_registrations(|table| Ok(table.remove_where(|g| groups.contains(g)) > 0));
            for group in &groups {
                self.groups.remove(group);
            }
        }
        queue.clear_all_delegations();

        for other in self.all_queues() {
            let pruned = other.prune_delegations_to(&name);
            if pruned > 0 {
                tracing::info!(
                    source = other.name(),
                    target = %name,
                    pruned,
                    "Delegation target reclaimed, reverting to local delivery"
                );
            }
        }

        self.objects.remove_if(&name, |_, object| {
            matches!(object, KernelObject::Queue(q) if Arc::ptr_eq(q, queue))
        });

        let abandoned = orphans.len();
        for request in orphans {
            request.abandon(&name);
        }
        if abandoned > 0 {
            tracing::warn!(queue = %name, abandoned, "Queue reclaimed with undelivered requests");
            metrics::record_abandoned(&name, abandoned);
        }
        tracing::info!(queue = %name, url_groups = groups.len(), "Request queue reclaimed");
    }
}

fn validate_name(name: &str) -> QueueResult<()> {
    if name.is_empty() || name.len() > 256 || name.chars().any(|c| c.is_control()) {
        return Err(QueueError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Namespace for InMemoryNamespace {
    fn create_queue(&self, name: &str, process: &ProcessId) -> QueueResult<Arc<KernelQueue>> {
        validate_name(name)?;
        if self.denied_creators.contains(process) {
            return Err(QueueError::PermissionDenied(format!(
                "process '{}' may not create request queues",
                process
            )));
        }

        match self.objects.entry(name.to_string()) {
            Entry::Occupied(_) => Err(QueueError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                let queue = Arc::new(KernelQueue::new(name, process.clone()));
                slot.insert(KernelObject::Queue(queue.clone()));
                tracing::info!(queue = name, process = %process, "Request queue created");
                Ok(queue)
            }
        }
    }

    fn open_queue(&self, name: &str, process: &ProcessId) -> QueueResult<Arc<KernelQueue>> {
        let object = self
            .objects
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;

        let queue = match object {
            KernelObject::Queue(queue) => queue,
            KernelObject::Foreign { kind } => {
                return Err(QueueError::IncompatibleMode {
                    name: name.to_string(),
                    kind,
                })
            }
        };
        queue.attach()?;
        tracing::info!(queue = name, process = %process, "Attached to request queue");
        Ok(queue)
    }

    fn release_queue(&self, queue: &Arc<KernelQueue>, mode: QueueMode) {
        tracing::debug!(queue = queue.name(), %mode, "Releasing queue handle");
        if let Some(orphans) = queue.detach(mode == QueueMode::Controller) {
            self.reclaim(queue, orphans);
        }
    }

    fn lookup_queue(&self, name: &str) -> Option<Arc<KernelQueue>> {
        match self.objects.get(name)?.value() {
            KernelObject::Queue(q) => Some(q.clone()),
            KernelObject::Foreign { .. } => None,
        }
    }

    fn describe(&self) -> Vec<QueueInfo> {
        let table = self.registrations.load();
        let mut infos: Vec<QueueInfo> = self
            .all_queues()
            .into_iter()
            .map(|queue| {
                let groups = self.groups_bound_to(&queue);
                let mut prefixes = Vec::new();
                let mut standby_prefixes = Vec::new();
                for (prefix, registrants) in table.iter() {
                    match registrants.iter().position(|g| groups.contains(g)) {
                        Some(0) => prefixes.push(prefix.clone()),
                        Some(_) => standby_prefixes.push(prefix.clone()),
                        None => {}
                    }
                }
                QueueInfo {
                    name: queue.name().to_string(),
                    owner: queue.owner().clone(),
                    handles: queue.handle_count(),
                    controller_open: queue.controller_open(),
                    pending: queue.pending_len(),
                    prefixes,
                    standby_prefixes,
                    delegations: queue.delegations().iter().map(DelegationInfo::from).collect(),
                    receivers_may_delegate: queue.receivers_may_delegate(),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    fn create_url_group(&self) -> UrlGroupId {
        let id = UrlGroupId::next();
        self.groups.insert(id, None);
        id
    }

    fn remove_url_group(&self, group: UrlGroupId) {
        if self.groups.remove(&group).is_some() {
            let _ = self.update_registrations(|table| Ok(table.remove_where(|g| *g == group) > 0));
            tracing::debug!(%group, "URL group removed");
        }
    }

    fn bind_url_group(&self, group: UrlGroupId, queue: &Arc<KernelQueue>) -> QueueResult<()> {
        if queue.is_reclaimed() {
            return Err(QueueError::NotFound(queue.name().to_string()));
        }
        let mut entry = self.groups.get_mut(&group).ok_or(QueueError::Closed)?;
        if let Some(existing) = entry.value() {
            if !Arc::ptr_eq(existing, queue) {
                if let Some(prefix) = self.group_prefixes(group).first() {
                    return Err(QueueError::PrefixConflict(prefix.to_string()));
                }
            }
        }
        *entry.value_mut() = Some(queue.clone());
        tracing::info!(%group, queue = queue.name(), "URL group bound");
        Ok(())
    }

    fn bound_queue(&self, group: UrlGroupId) -> Option<Arc<KernelQueue>> {
        self.groups.get(&group).and_then(|entry| entry.value().clone())
    }

    fn add_prefix(&self, group: UrlGroupId, prefix: &UrlPrefix) -> QueueResult<()> {
        let mine = self
            .groups
            .get(&group)
            .map(|entry| entry.value().clone())
            .ok_or(QueueError::Closed)?;

        let mut standby = false;
        let changed = self.update_registrations(|table| {
            match table.get(prefix) {
                None => {}
                Some(registrants) if registrants.contains(&group) => return Ok(false),
                Some(registrants) => {
                    // The holder may share the prefix only with the queue it delegates it to.
                    let holder = self.bound_queue(registrants[0]);
                    let delegated_to_us = match (&mine, holder) {
                        (Some(mine), Some(holder)) => holder
                            .delegations()
                            .get(prefix)
                            .is_some_and(|b| b.is_live() && Arc::ptr_eq(b.target(), mine)),
                        _ => false,
                    };
                    if !delegated_to_us {
                        return Err(QueueError::PrefixConflict(prefix.to_string()));
                    }
                    standby = true;
                }
            }
            Ok(table.insert(prefix.clone(), group))
        })?;

        if changed {
            tracing::info!(%group, %prefix, standby, "Prefix registered");
        }
        Ok(())
    }

    fn remove_prefix(&self, group: UrlGroupId, prefix: &UrlPrefix) {
        if let Ok(true) = self.update_registrations(|table| Ok(table.remove(prefix, &group))) {
            tracing::info!(%group, %prefix, "Prefix unregistered");
        }
    }

    fn group_prefixes(&self, group: UrlGroupId) -> Vec<UrlPrefix> {
        self.registrations.load().prefixes_of(&group)
    }

    fn owned_prefixes(&self, queue: &str) -> Vec<UrlPrefix> {
        let Some(queue) = self.lookup_queue(queue) else {
            return Vec::new();
        };
        let groups = self.groups_bound_to(&queue);
        self.registrations
            .load()
            .iter()
            .filter(|(_, registrants)| registrants.first().is_some_and(|g| groups.contains(g)))
            .map(|(prefix, _)| prefix.clone())
            .collect()
    }

    fn registered_prefixes(&self, queue: &str) -> Vec<UrlPrefix> {
        let Some(queue) = self.lookup_queue(queue) else {
            return Vec::new();
        };
        let groups = self.groups_bound_to(&queue);
        self.registrations
            .load()
            .iter()
            .filter(|(_, registrants)| registrants.iter().any(|g| groups.contains(g)))
            .map(|(prefix, _)| prefix.clone())
            .collect()
    }

    fn resolve(&self, url: &Url) -> Option<Arc<KernelQueue>> {
        let table = self.registrations.load();
        let (_, group) = table.longest_match(url)?;
        self.bound_queue(*group)
    }
}
