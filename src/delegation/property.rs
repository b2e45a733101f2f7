//! The delegation property: "send requests for this URI to that queue".

use std::sync::Arc;

use serde::Serialize;

use crate::delegation::binding::{BindingChange, DelegationBinding};
use crate::error::{QueueError, QueueResult};
use crate::kernel::{KernelQueue, Namespace, ProcessId};
use crate::queue::{QueueMode, ReceiverQueue};
use crate::routing::UrlPrefix;

/// Capability exposed by a running server on its bound queue.
pub trait ServerDelegationProperty {
    fn set_delegation_property(&self, queue_name: &str, uri: &str) -> QueueResult<RequestQueueWrapper>;
}

/// Result of a successful delegation call.
///
/// Holds a Receiver reference on the target for as long as the caller keeps it;
/// the target itself is owned by whoever created it.
#[derive(Debug)]
pub struct RequestQueueWrapper {
    queue_name: String,
    uri: UrlPrefix,
    change: BindingChange,
    queue: ReceiverQueue,
}

impl RequestQueueWrapper {
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn uri(&self) -> &UrlPrefix {
        &self.uri
    }

    /// Whether the call added, replaced or left the binding unchanged.
    pub fn change(&self) -> &BindingChange {
        &self.change
    }

    pub fn queue(&self) -> &ReceiverQueue {
        &self.queue
    }

    pub fn summary(&self) -> DelegationSummary {
        DelegationSummary {
            queue_name: self.queue_name.clone(),
            uri: self.uri.clone(),
            replaced: match &self.change {
                BindingChange::Replaced { previous } => Some(previous.clone()),
                _ => None,
            },
        }
    }
}

/// Serializable view of a wrapper for ops tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelegationSummary {
    pub queue_name: String,
    pub uri: UrlPrefix,
    pub replaced: Option<String>,
}

/// Routing state of one URI on a source queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "target", rename_all = "snake_case")]
pub enum DelegationState {
    /// Served by the source queue itself.
    Bound,
    /// Forwarded to the named queue.
    Delegated(String),
    /// The source queue owns no prefix covering the URI.
    Unbound,
}

fn authorize(source: &KernelQueue, caller: &ProcessId, mode: QueueMode) -> QueueResult<()> {
    let allowed = match mode {
        QueueMode::Controller => source.owner() == caller,
        QueueMode::Receiver => source.receivers_may_delegate(),
    };
    if allowed {
        Ok(())
    } else {
        Err(QueueError::PermissionDenied(format!(
            "process '{}' ({}) may not configure delegation on '{}'",
            caller,
            mode,
            source.name()
        )))
    }
}

pub(crate) fn install(
    namespace: &Arc<dyn Namespace>,
    source: &Arc<KernelQueue>,
    caller: &ProcessId,
    mode: QueueMode,
    queue_name: &str,
    uri: &str,
) -> QueueResult<RequestQueueWrapper> {
    authorize(source, caller, mode)?;

    let prefix = UrlPrefix::parse(uri)?;
    let registered = namespace.registered_prefixes(source.name());
    if !registered.iter().any(|p| p.contains(&prefix)) {
        return Err(QueueError::invalid_prefix(
            uri,
            format!("not covered by any prefix registered by queue '{}'", source.name()),
        ));
    }
    if queue_name == source.name() {
        return Err(QueueError::SelfDelegation(queue_name.to_string()));
    }

    let queue = ReceiverQueue::attach(namespace.clone(), caller, queue_name).map_err(|e| match e {
        QueueError::NotFound(_) | QueueError::IncompatibleMode { .. } => {
            QueueError::TargetNotFound(queue_name.to_string())
        }
        other => other,
    })?;

    if source.is_reclaimed() {
        return Err(QueueError::Closed);
    }
    let change = source.install_delegation(DelegationBinding::new(
        source.name(),
        queue.kernel().clone(),
        prefix.clone(),
    ));

    match &change {
        BindingChange::Added => {
            tracing::info!(source = source.name(), target = queue_name, uri = %prefix, "Delegation set")
        }
        BindingChange::Replaced { previous } => tracing::info!(
            source = source.name(),
            target = queue_name,
            previous = %previous,
            uri = %prefix,
            "Delegation replaced"
        ),
        BindingChange::Unchanged => {
            tracing::debug!(source = source.name(), target = queue_name, uri = %prefix, "Delegation unchanged")
        }
    }

    Ok(RequestQueueWrapper {
        queue_name: queue_name.to_string(),
        uri: prefix,
        change,
        queue,
    })
}

pub(crate) fn clear(source: &KernelQueue, caller: &ProcessId, mode: QueueMode, uri: &str) -> QueueResult<bool> {
    authorize(source, caller, mode)?;
    let prefix = UrlPrefix::parse(uri)?;
    let removed = source.clear_delegation(&prefix);
    if removed {
        tracing::info!(source = source.name(), uri = %prefix, "Delegation cleared");
    }
    Ok(removed)
}

/// Where requests for `uri` arriving on `source` go right now.
pub fn delegation_state(namespace: &dyn Namespace, source: &KernelQueue, uri: &str) -> QueueResult<DelegationState> {
    let prefix = UrlPrefix::parse(uri)?;
    if let Some(binding) = source.delegations().get(&prefix) {
        if binding.is_live() {
            return Ok(DelegationState::Delegated(binding.target_name().to_string()));
        }
    }
    let owned = namespace.owned_prefixes(source.name());
    if owned.iter().any(|p| p.contains(&prefix)) {
        Ok(DelegationState::Bound)
    } else {
        Ok(DelegationState::Unbound)
    }
}
