//! Request-queue delegation.
//!
//! # Responsibilities
//! - Validate and install "URI → target queue" bindings on a source queue
//! - Publish binding changes atomically to the accept path
//! - Report the current routing state of a URI
//!
//! # Design Decisions
//! - Only the bound queue's owner, or a Receiver explicitly granted the right,
//!   may change bindings
//! - A binding keeps the target's kernel object reachable but never its name:
//!   once every handle on the target closes, the binding is dead and pruned

pub mod binding;
pub mod property;

pub use binding::{BindingChange, DelegationBinding, DelegationInfo, DelegationTable};
pub use property::{delegation_state, DelegationState, DelegationSummary, RequestQueueWrapper, ServerDelegationProperty};
