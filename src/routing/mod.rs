//! Prefix routing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request URL (scheme, host, port, path)
//!     → table.rs (longest matching registered prefix)
//!     → prefix.rs (scheme/port/host/path match)
//!     → Return: owning URL group, or NoRoute
//!
//! Registration:
//!     "http://+:8080/api"
//!     → prefix.rs (parse, normalize trailing slash)
//!     → table.rs (primary, or standby behind a delegating holder)
//! ```
//!
//! # Design Decisions
//! - Longest path wins; equal paths rank `+` over named hosts over `*`
//! - Tables are snapshots swapped atomically, never mutated in place
//! - Deterministic: same table and URL always resolve to the same registrant

pub mod prefix;
pub mod table;

pub use prefix::{HostPattern, Scheme, UrlPrefix};
pub use table::PrefixTable;
