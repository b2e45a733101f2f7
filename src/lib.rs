//! Named HTTP request queues with URL-prefix routing and request-queue
//! delegation, hosted by zero-downtime server generations.

pub mod admin;
pub mod config;
pub mod delegation;
pub mod error;
pub mod http;
pub mod kernel;
pub mod lifecycle;
pub mod observability;
pub mod queue;
pub mod resilience;
pub mod routing;
pub mod server;

pub use config::ServiceConfig;
pub use delegation::{RequestQueueWrapper, ServerDelegationProperty};
pub use error::{QueueError, QueueResult};
pub use kernel::{deliver, InMemoryNamespace, Namespace, ProcessId, QueueResponse, QueuedRequest};
pub use lifecycle::{Shutdown, Supervisor};
pub use queue::{ControllerQueue, QueueMode, ReceiverQueue, RequestQueue, UrlGroup};
pub use server::{EchoHandler, RequestHandler, Server};
