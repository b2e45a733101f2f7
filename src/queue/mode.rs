//! Handle access modes.
//!
//! `QueueMode` is the runtime value (config files, diagnostics). The `Controller` and
//! `Receiver` marker types carry the same information at the type level so owning and
//! non-owning handles cannot be confused.

use serde::{Deserialize, Serialize};

/// How a process holds a request queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// Creator and owner of the queue.
    #[default]
    Controller,
    /// Attached to a queue created by someone else.
    Receiver,
}

impl std::fmt::Display for QueueMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueMode::Controller => f.write_str("controller"),
            QueueMode::Receiver => f.write_str("receiver"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Type-level handle mode. Implemented only by [`Controller`] and [`Receiver`].
pub trait Mode: sealed::Sealed + Send + Sync + 'static {
    const MODE: QueueMode;
}

/// Marker for owning handles.
#[derive(Debug)]
pub enum Controller {}

/// Marker for attached, non-owning handles.
#[derive(Debug)]
pub enum Receiver {}

impl sealed::Sealed for Controller {}
impl sealed::Sealed for Receiver {}

impl Mode for Controller {
    const MODE: QueueMode = QueueMode::Controller;
}

impl Mode for Receiver {
    const MODE: QueueMode = QueueMode::Receiver;
}
