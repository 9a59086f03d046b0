//! Configuration system tests.

use runmetrics_lib::core::config::{LogLevel, StorageBackendKind};
use runmetrics_lib::core::{Config, ConfigBuilder};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.agent.poll_interval, Duration::from_secs(2));
    assert_eq!(config.agent.report_interval, Duration::from_secs(10));
    assert_eq!(config.server.address, "0.0.0.0:8080");
    assert_eq!(config.storage.backend, StorageBackendKind::Memory);
    assert_eq!(config.storage.file_storage_path, PathBuf::from("/tmp/metrics-db.json"));
    assert!(config.agent.key.is_none());
}

#[test]
fn test_config_builder() {
    let config = ConfigBuilder::new()
        .server_url("127.0.0.1:9000")
        .poll_interval(Duration::from_secs(1))
        .report_interval(Duration::from_secs(5))
        .workers(3)
        .key("secret")
        .log_level(LogLevel::Warn)
        .build()
        .unwrap();

    assert_eq!(config.agent_base_url(), "http://127.0.0.1:9000");
    assert_eq!(config.agent.workers, 3);
    assert_eq!(config.agent.key.as_deref(), Some("secret"));
    assert_eq!(config.server.key.as_deref(), Some("secret"));
    assert_eq!(config.logging.level, LogLevel::Warn);
}

#[test]
fn test_database_url_selects_relational_backend() {
    let config = ConfigBuilder::new()
        .database_url("sqlite::memory:")
        .build()
        .unwrap();

    assert_eq!(config.storage.backend, StorageBackendKind::Relational);
    assert_eq!(config.storage.database_url.as_deref(), Some("sqlite::memory:"));
}

#[test]
fn test_yaml_partial_config_keeps_defaults() {
    let yaml = r#"
server:
  address: "127.0.0.1:8181"
storage:
  store_interval: 30s
  restore: false
"#;

    let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

    assert_eq!(config.server.address, "127.0.0.1:8181");
    assert_eq!(config.storage.store_interval, Duration::from_secs(30));
    assert!(!config.storage.restore);
    assert_eq!(config.agent.workers, 5);
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn test_invalid_yaml_is_rejected() {
    assert!(ConfigBuilder::new().from_yaml("agent: [not, a, map]").is_err());
}

#[test]
fn test_validation() {
    let mut config = Config::default();
    config.agent.report_interval = Duration::ZERO;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.retry.base_delay = Duration::from_secs(10);
    config.retry.max_delay = Duration::from_secs(1);
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.storage.backend = StorageBackendKind::Relational;
    config.storage.database_url = Some(String::new());
    assert!(config.validate().is_err());
}
