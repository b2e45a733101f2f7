//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! kernel / server / lifecycle
//!     → logging.rs (structured events via tracing)
//!     → metrics.rs (per-queue counters and depth gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Every metric carries a `queue` label; delegation counters also carry `target`
//! - Recording is a no-op until a recorder is installed, so tests need no setup

pub mod logging;
pub mod metrics;
