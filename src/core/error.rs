use crate::core::types::MetricKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metric not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Metric type not correct: {0}")]
    TypeNotCorrect(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Fault raised on purpose by tests to exercise the retry path.
    #[error("Injected test fault: {0}")]
    InjectedFault(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for runmetrics operations
pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    /// Creates a not-found error for a `(kind, name)` pair
    pub fn not_found<S: Into<String>>(kind: MetricKind, name: S) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Creates an injected fault, only meant for tests
    pub fn injected<S: Into<String>>(msg: S) -> Self {
        Self::InjectedFault(msg.into())
    }

    /// Returns true if the caller sent something malformed
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::TypeNotCorrect(_))
    }

    /// Returns true for lookup misses
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Parse { .. } | Self::TypeNotCorrect(_) => "validation",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Database(_) | Self::Migration(_) => "database",
            Self::Network(_) => "network",
            Self::Config(_) => "config",
            Self::InjectedFault(_) => "test",
            Self::Cancelled => "cancelled",
            Self::Join(_) => "async",
        }
    }
}
