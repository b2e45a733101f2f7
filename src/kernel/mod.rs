//! Kernel-side objects: the namespace, request queues and the accept path.
//!
//! # Data Flow
//! ```text
//! Inbound request (method, URL, headers, body)
//!     → delivery.rs (deliver)
//!         → namespace.rs (resolve: longest registered prefix → owning queue)
//!         → owner's DelegationTable snapshot (most specific live binding)
//!     → queue.rs (enqueue on target or owner)
//!     → worker dequeues → response travels back on the request's reply channel
//!
//! Handle lifecycle:
//!     create_queue (Controller ref) / open_queue (Receiver ref)
//!     → release_queue
//!     → last ref: reclaim (unregister prefixes, promote standbys,
//!       prune delegations to it, answer pending requests with 503)
//! ```
//!
//! # Design Decisions
//! - The namespace is injected (`Arc<dyn Namespace>`), never a global
//! - Routing reads only atomic snapshots, administrative calls swap them

pub mod delivery;
pub mod memory;
pub mod namespace;
pub mod queue;
pub mod request;

pub use delivery::{deliver, Delivery};
pub use memory::InMemoryNamespace;
pub use namespace::{Namespace, ProcessId, QueueInfo, UrlGroupId};
pub use queue::KernelQueue;
pub use request::{QueueResponse, QueuedRequest, RequestId};
