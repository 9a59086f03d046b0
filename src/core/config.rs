//! Configuration management for runmetrics.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by the `cli` module)
//! - Validation and defaults

use crate::core::retry::RetryConfig;
use crate::core::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration for runmetrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent (sampler + dispatcher) configuration
    pub agent: AgentConfig,
    /// Collector server configuration
    pub server: ServerConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Retry policy for storage operations
    pub retry: RetryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the collector
    pub server_url: String,
    /// Sampling period
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Delivery period
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    /// Number of concurrent senders per delivery tick, one extra sender is always added
    pub workers: usize,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// HMAC signing key, signing is disabled when absent
    pub key: Option<String>,
}

/// Collector server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address in `host:port` form
    pub address: String,
    /// HMAC key used to verify incoming payloads
    pub key: Option<String>,
}

/// Which repository implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Memory,
    Relational,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend selected at startup
    pub backend: StorageBackendKind,
    /// Snapshot file of the memory store
    pub file_storage_path: PathBuf,
    /// Snapshot flush period, zero means persist on every write
    #[serde(with = "humantime_serde")]
    pub store_interval: Duration,
    /// Load the snapshot file on startup
    pub restore: bool,
    /// Connection string of the relational store
    pub database_url: Option<String>,
    /// Connection pool size of the relational store
    pub max_connections: u32,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include targets, thread ids and line numbers
    pub structured: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            server_url: "http://localhost:8080".to_string(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            workers: 5,
            request_timeout: Duration::from_secs(5),
            key: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "0.0.0.0:8080".to_string(),
            key: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackendKind::Memory,
            file_storage_path: PathBuf::from("/tmp/metrics-db.json"),
            store_interval: Duration::from_secs(300),
            restore: true,
            database_url: None,
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.agent.server_url.trim().is_empty() {
            return Err(MetricsError::config("agent server_url cannot be empty"));
        }

        if self.agent.poll_interval.is_zero() || self.agent.report_interval.is_zero() {
            return Err(MetricsError::config(
                "poll_interval and report_interval must be greater than 0",
            ));
        }

        if self.agent.workers == 0 {
            return Err(MetricsError::config("workers must be greater than 0"));
        }

        if self.storage.backend == StorageBackendKind::Relational
            && self.storage.database_url.as_deref().map_or(true, str::is_empty)
        {
            return Err(MetricsError::config("relational storage requires a database_url"));
        }

        if self.storage.max_connections == 0 {
            return Err(MetricsError::config("max_connections must be greater than 0"));
        }

        if self.retry.max_attempts == 0 {
            return Err(MetricsError::config("retry max_attempts must be greater than 0"));
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(MetricsError::config(format!(
                "retry base_delay {:?} exceeds max_delay {:?}",
                self.retry.base_delay, self.retry.max_delay
            )));
        }

        Ok(())
    }

    /// Collector URL with a scheme, `http://` is assumed when missing
    pub fn agent_base_url(&self) -> String {
        normalize_url(&self.agent.server_url)
    }
}

/// Prefixes `http://` to addresses that carry no scheme.
pub fn normalize_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(MetricsError::config(format!("unknown log level: {other}"))),
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| MetricsError::config(format!("Failed to parse YAML config: {e}")))?;
        Ok(self)
    }

    /// Set the collector URL used by the agent
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.agent.server_url = url.into();
        self
    }

    /// Set the sampling period
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.agent.poll_interval = interval;
        self
    }

    /// Set the delivery period
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.config.agent.report_interval = interval;
        self
    }

    /// Set the sender pool size
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.agent.workers = workers;
        self
    }

    /// Set the signing key for both agent and server
    pub fn key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.agent.key = Some(key.clone());
        self.config.server.key = Some(key);
        self
    }

    /// Set the listen address of the server
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.server.address = address.into();
        self
    }

    /// Set the snapshot file path
    pub fn file_storage_path(mut self, path: PathBuf) -> Self {
        self.config.storage.file_storage_path = path;
        self
    }

    /// Set the snapshot flush period
    pub fn store_interval(mut self, interval: Duration) -> Self {
        self.config.storage.store_interval = interval;
        self
    }

    /// Enable or disable restore on startup
    pub fn restore(mut self, restore: bool) -> Self {
        self.config.storage.restore = restore;
        self
    }

    /// Use the relational backend with the given connection string
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.storage.database_url = Some(url.into());
        self.config.storage.backend = StorageBackendKind::Relational;
        self
    }

    /// Set the log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
