//! Command-line interface for runmetrics.
//!
//! `runmetrics agent` samples this host and relays the samples to a collector,
//! `runmetrics server` runs the collector.

use crate::application::{AgentApplication, ServerApplication};
use crate::core::config::{ConfigBuilder, LogLevel, LoggingConfig};
use crate::core::{Config, MetricsError, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runtime metrics agent and collector
#[derive(Parser, Debug)]
#[command(name = "runmetrics")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/runmetrics/config.yaml)
    #[arg(short, long, global = true, env = "RUNMETRICS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Include targets, thread ids and line numbers in log lines
    #[arg(long, global = true, env = "APP_MODE_STRUCTURED")]
    pub structured_logs: bool,

    /// Validate configuration and exit
    #[arg(long, global = true)]
    pub check_config: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sample this host and deliver the samples to a collector
    Agent(AgentArgs),
    /// Run the collector
    Server(ServerArgs),
}

#[derive(Args, Debug, Default)]
pub struct AgentArgs {
    /// Collector address, `http://` is assumed without a scheme
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Delivery period in seconds
    #[arg(short = 'r', long, env = "REPORT_INTERVAL")]
    pub report_interval: Option<u64>,

    /// Sampling period in seconds
    #[arg(short = 'p', long, env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Key used to sign payloads
    #[arg(short = 'k', long, env = "KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Concurrent senders per delivery, one more is always added
    #[arg(long, env = "RATE_LIMIT")]
    pub workers: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Listen address
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Snapshot flush period in seconds, 0 persists every write
    #[arg(short = 'i', long, env = "STORE_INTERVAL")]
    pub store_interval: Option<u64>,

    /// Snapshot file of the memory store
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    pub file_storage_path: Option<PathBuf>,

    /// Restore the snapshot file on startup
    #[arg(long, env = "RESTORE")]
    pub restore: Option<bool>,

    /// Database connection string, selects the relational store
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Key used to verify payload signatures
    #[arg(short = 'k', long, env = "KEY", hide_env_values = true)]
    pub key: Option<String>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment variables (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|d| d.join("runmetrics").join("config.yaml"))
                .filter(|path| path.exists()),
        };

        if let Some(config_path) = config_path {
            match tokio::fs::read_to_string(&config_path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                    tracing::info!("Loaded configuration from: {:?}", config_path);
                }
                Err(e) if self.config.is_some() => {
                    // User explicitly specified a config file that doesn't exist
                    return Err(MetricsError::config(format!(
                        "Failed to read config file {:?}: {}",
                        config_path, e
                    )));
                }
                Err(_) => {
                    tracing::debug!("No config file found at {:?}, using defaults", config_path);
                }
            }
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(level) = &self.log_level {
            builder = builder.log_level(level.parse::<LogLevel>()?);
        }

        match &self.command {
            Command::Agent(args) => {
                if let Some(address) = &args.address {
                    builder = builder.server_url(address.clone());
                }
                if let Some(secs) = args.report_interval {
                    builder = builder.report_interval(Duration::from_secs(secs));
                }
                if let Some(secs) = args.poll_interval {
                    builder = builder.poll_interval(Duration::from_secs(secs));
                }
                if let Some(key) = &args.key {
                    builder = builder.key(key.clone());
                }
                if let Some(workers) = args.workers {
                    builder = builder.workers(workers);
                }
            }
            Command::Server(args) => {
                if let Some(address) = &args.address {
                    builder = builder.address(address.clone());
                }
                if let Some(secs) = args.store_interval {
                    builder = builder.store_interval(Duration::from_secs(secs));
                }
                if let Some(path) = &args.file_storage_path {
                    builder = builder.file_storage_path(path.clone());
                }
                if let Some(restore) = args.restore {
                    builder = builder.restore(restore);
                }
                if let Some(dsn) = args.database_dsn.as_deref().filter(|dsn| !dsn.is_empty()) {
                    builder = builder.database_url(dsn);
                }
                if let Some(key) = &args.key {
                    builder = builder.key(key.clone());
                }
            }
        }

        let mut config = builder.build()?;
        config.logging.structured |= self.structured_logs;
        Ok(config)
    }
}

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let fmt_layer = if logging.structured {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .compact()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).compact()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| MetricsError::config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Cancels `cancel` on Ctrl-C.
pub fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => tracing::info!("Received shutdown signal"),
                    Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
                }
                cancel.cancel();
            }
            () = cancel.cancelled() => {}
        }
    });
}

/// Execute the selected command.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    init_logging(&config.logging)?;

    if cli.check_config {
        println!("Configuration is valid!");
        match &cli.command {
            Command::Agent(_) => {
                println!("  Collector: {}", config.agent_base_url());
                println!("  Poll interval: {:?}", config.agent.poll_interval);
                println!("  Report interval: {:?}", config.agent.report_interval);
                println!("  Senders: {}", config.agent.workers + 1);
            }
            Command::Server(_) => {
                println!("  Address: {}", config.server.address);
                println!("  Backend: {:?}", config.storage.backend);
                println!("  Snapshot file: {}", config.storage.file_storage_path.display());
                println!("  Store interval: {:?}", config.storage.store_interval);
            }
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    match cli.command {
        Command::Agent(_) => {
            tracing::info!("Starting agent");
            AgentApplication::new(&config, cancel)?.run().await
        }
        Command::Server(_) => {
            tracing::info!("Starting collector");
            ServerApplication::new(config, cancel).await?.run().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StorageBackendKind;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_agent_flags_override_defaults() {
        let cli = parse(&["runmetrics", "agent", "-a", "collector:9000", "-r", "4", "-p", "1", "-k", "s3cret"]);
        let config = cli.build_config_from_args(ConfigBuilder::new()).unwrap();

        assert_eq!(config.agent_base_url(), "http://collector:9000");
        assert_eq!(config.agent.report_interval, Duration::from_secs(4));
        assert_eq!(config.agent.poll_interval, Duration::from_secs(1));
        assert_eq!(config.agent.key.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_server_database_selects_relational_backend() {
        let cli = parse(&["runmetrics", "server", "-d", "sqlite://metrics.db", "-i", "0"]);
        let config = cli.build_config_from_args(ConfigBuilder::new()).unwrap();

        assert_eq!(config.storage.backend, StorageBackendKind::Relational);
        assert!(config.storage.store_interval.is_zero());
    }

    #[test]
    fn test_server_restore_flag() {
        let cli = parse(&["runmetrics", "server", "--restore", "false", "-f", "/tmp/m.json"]);
        let config = cli.build_config_from_args(ConfigBuilder::new()).unwrap();

        assert!(!config.storage.restore);
        assert_eq!(config.storage.file_storage_path, PathBuf::from("/tmp/m.json"));
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        let cli = parse(&["runmetrics", "-l", "loud", "agent"]);
        assert!(cli.build_config_from_args(ConfigBuilder::new()).is_err());
    }
}
