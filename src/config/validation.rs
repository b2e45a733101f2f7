//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Queue names unique and valid, prefixes and delegation URIs parse
//! - No prefix registered by two queues, receivers register none
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ServiceConfig → Result<(), Vec<ValidationError>>

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;
use crate::queue::QueueMode;
use crate::routing::UrlPrefix;

/// One semantic problem, located by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if !matches!(config.listener.scheme.as_str(), "http" | "https") {
        errors.push(ValidationError::new("listener.scheme", "must be http or https"));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }
    if config.process.name.trim().is_empty() {
        errors.push(ValidationError::new("process.name", "must not be empty"));
    }

    validate_queues(config, &mut errors);

    for (i, delegation) in config.delegations.iter().enumerate() {
        if delegation.queue_name.is_empty() {
            errors.push(ValidationError::new(format!("delegations[{i}].queue_name"), "must not be empty"));
        }
        if let Err(e) = UrlPrefix::parse(&delegation.uri) {
            errors.push(ValidationError::new(format!("delegations[{i}].uri"), e.to_string()));
        }
    }

    if config.drain.poll_interval_ms == 0 {
        errors.push(ValidationError::new("drain.poll_interval_ms", "must be greater than 0"));
    }
    if config.handoff.base_queue_name.is_empty() {
        errors.push(ValidationError::new("handoff.base_queue_name", "must not be empty"));
    }
    if config.handoff.workers == 0 {
        errors.push(ValidationError::new("handoff.workers", "must be greater than 0"));
    }
    if config.retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.admin.enabled {
        if config.admin.api_key.len() < 16 {
            errors.push(ValidationError::new("admin.api_key", "must be at least 16 characters"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new("observability.log_format", "must be pretty or json"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_queues(config: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    if !config.queues.iter().any(|q| q.mode == QueueMode::Controller) {
        errors.push(ValidationError::new("queues", "at least one controller queue is required"));
    }

    let mut names = HashSet::new();
    let mut registered: HashMap<UrlPrefix, &str> = HashMap::new();

    for (i, queue) in config.queues.iter().enumerate() {
        let field = |name: &str| format!("queues[{i}].{name}");

        if queue.name.is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        } else if !names.insert(queue.name.as_str()) {
            errors.push(ValidationError::new(field("name"), format!("duplicate queue '{}'", queue.name)));
        }
        if queue.workers == 0 {
            errors.push(ValidationError::new(field("workers"), "must be greater than 0"));
        }
        if queue.mode == QueueMode::Receiver && !queue.prefixes.is_empty() {
            errors.push(ValidationError::new(field("prefixes"), "receiver queues cannot register prefixes"));
        }

        for prefix in &queue.prefixes {
            match UrlPrefix::parse(prefix) {
                Ok(parsed) => {
                    if let Some(other) = registered.insert(parsed.clone(), &queue.name) {
                        if other != queue.name {
                            errors.push(ValidationError::new(
                                field("prefixes"),
                                format!("'{parsed}' is already registered by queue '{other}'"),
                            ));
                        }
                    }
                }
                Err(e) => errors.push(ValidationError::new(field("prefixes"), e.to_string())),
            }
        }
    }
}
