//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    load_config_str(&content)
}

/// Parse and validate configuration from TOML text.
pub fn load_config_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueMode;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = load_config_str("").unwrap();
        assert_eq!(config.queues.len(), 1);
        assert_eq!(config.queues[0].name, "svc-v1");
        assert_eq!(config.queues[0].prefixes, vec!["http://+:8080/"]);
        assert_eq!(config.drain.timeout_secs, 30);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_full_file() {
        let config = load_config_str(
            r#"
            [process]
            name = "worker-a"

            [[queues]]
            name = "svc-v1"
            prefixes = ["http://+:8080/", "http://api.local:8080/v2/"]
            workers = 2
            permit_receiver_delegation = true

            [[queues]]
            name = "shared"
            mode = "receiver"

            [[delegations]]
            queue_name = "svc-v2"
            uri = "http://+:8080/api/"

            [drain]
            timeout_secs = 5

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.process.name, "worker-a");
        assert_eq!(config.queues[0].workers, 2);
        assert!(config.queues[0].permit_receiver_delegation);
        assert_eq!(config.queues[1].mode, QueueMode::Receiver);
        assert_eq!(config.queues[1].workers, 4);
        assert_eq!(config.delegations[0].uri, "http://+:8080/api/");
        assert_eq!(config.drain.timeout_secs, 5);
        assert_eq!(config.drain.poll_interval_ms, 100);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(load_config_str("queues = 3"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_error_lists_everything() {
        let err = load_config_str(
            r#"
            [[queues]]
            name = ""
            workers = 0
            prefixes = ["bogus"]
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert!(errors.len() >= 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(load_config(Path::new("/nonexistent/queue.toml")), Err(ConfigError::Io(_))));
    }
}
