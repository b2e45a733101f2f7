//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP → handoff to a new generation
//!
//! Handoff (handoff.rs):
//!     new generation → delegate prefixes → standby registration
//!     → drain old (drain.rs) → close old → standbys promoted
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop ingress → drain → close handles → exit
//! ```
//!
//! # Design Decisions
//! - Draining is bounded by a timeout; whatever is still queued afterwards is
//!   answered with 503 when the handle closes

pub mod drain;
pub mod handoff;
pub mod shutdown;
pub mod signals;

pub use drain::{DrainPolicy, DrainReport, InFlightTracker};
pub use handoff::{HandoffReport, Supervisor, SupervisorStatus};
pub use shutdown::Shutdown;
pub use signals::{SignalEvent, Signals};
