//! Error taxonomy for queue, URL group and delegation operations.

use thiserror::Error;

/// Errors surfaced by the request-queue subsystem.
///
/// Creation and binding errors are always returned to the caller synchronously.
/// `ServiceUnavailable` is the only variant that is normally seen by clients of the
/// queued requests rather than by the administrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// No object with this name exists in the namespace.
    #[error("queue '{0}' not found")]
    NotFound(String),

    /// Queue names must be non-empty and free of control characters.
    #[error("invalid queue name '{0}'")]
    InvalidName(String),

    /// A queue with this name already exists.
    #[error("queue '{0}' already exists")]
    AlreadyExists(String),

    /// The named object exists but is not a request queue.
    #[error("object '{name}' is a {kind}, not a request queue")]
    IncompatibleMode { name: String, kind: String },

    /// The calling process lacks rights for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The prefix is already registered by another URL group.
    #[error("prefix '{0}' is already registered by another URL group")]
    PrefixConflict(String),

    /// Malformed prefix or URI. Never retried.
    #[error("invalid prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    /// Delegation target queue could not be resolved.
    #[error("delegation target queue '{0}' not found")]
    TargetNotFound(String),

    /// A queue cannot delegate to itself.
    #[error("queue '{0}' cannot delegate to itself")]
    SelfDelegation(String),

    /// The queue was reclaimed while holding the request.
    #[error("service unavailable: queue '{0}' was closed")]
    ServiceUnavailable(String),

    /// No registered prefix matches the inbound request.
    #[error("no URL group matches '{0}'")]
    NoRoute(String),

    /// The queue or handle was closed while waiting on it.
    #[error("queue closed")]
    Closed,
}

impl QueueError {
    pub(crate) fn invalid_prefix(prefix: &str, reason: impl Into<String>) -> Self {
        QueueError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors the caller may retry once the namespace changes
    /// (the target queue gets created, or the creator lost a race and attaches instead).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueueError::TargetNotFound(_) | QueueError::AlreadyExists(_)
        )
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
