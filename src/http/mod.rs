//! HTTP front door.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → ingress.rs (axum fallback: build the queued request, deliver, await reply)
//!     → kernel::deliver (route by prefix, follow delegation, enqueue)
//!     → worker replies on the request's channel
//!     → response.rs (QueueResponse → HTTP response)
//! ```

pub mod ingress;
pub mod response;

pub use ingress::{build_router, serve, IngressState};
pub use response::status_for;
