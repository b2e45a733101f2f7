//! Server processes hosting request queues.
//!
//! # Data Flow
//! ```text
//! Server::start
//!     → create (Controller) or attach (Receiver) each configured queue
//!     → bind a URL group per Controller queue, register its prefixes
//!     → worker.rs: N tasks per queue dequeue → RequestHandler → reply
//!
//! Server::shutdown
//!     → lifecycle::drain (pending + in-flight reach zero, or timeout)
//!     → close handles (last reference reclaims, standbys take over)
//!     → join workers
//! ```

pub mod handler;
pub mod host;
pub mod worker;

pub use handler::{EchoHandler, RequestHandler};
pub use host::{Server, ServerStatus};
