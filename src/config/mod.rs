//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates the new file
//!     → daemon reconciles config-managed delegations on the running generation
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Only delegations are reloadable; queue and listener changes need a handoff or restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_config_str, ConfigError};
pub use schema::{
    AdminConfig, DelegationConfig, DrainConfig, HandoffConfig, ListenerConfig, ObservabilityConfig, ProcessConfig,
    QueueConfig, QueueList, ServiceConfig, TimeoutConfig,
};
pub use watcher::ConfigWatcher;
