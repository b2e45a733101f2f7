//! Retry helpers for namespace races.
//!
//! # Data Flow
//! ```text
//! create_or_attach / delegation to a not-yet-created target:
//!     → retries.rs (is the error retryable? attempts left?)
//!     → backoff.rs (exponential delay with jitter)
//! ```
//!
//! # Design Decisions
//! - Only `TargetNotFound` and `AlreadyExists` are retried; everything else is a
//!   caller error and surfaces immediately

pub mod backoff;
pub mod retries;

pub use retries::{retry, AttachRetry};
