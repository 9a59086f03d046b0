//! Core domain models and cross-cutting concerns for runmetrics.
//!
//! This module contains the metric model with its merge rule, the error type,
//! configuration, the retry policy and payload signing.

pub mod config;
pub mod error;
pub mod retry;
pub mod sign;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder};
pub use error::{MetricsError, Result};
pub use retry::{retry_with_backoff, RetryConfig};
pub use sign::Signer;
pub use types::{Metric, MetricKind, MetricValue};
