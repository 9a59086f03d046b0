//! runmetrics - runtime metrics agent and collector.
//!
//! The agent samples process and host statistics on a fixed period and relays every
//! sampled field to a collector. The collector merges incoming samples by kind
//! (gauges replace, counters accumulate) and persists them either in memory with
//! file snapshots or in a relational database.
//!
//! # Architecture
//!
//! - `core`: metric model, errors, configuration, retry policy, signing
//! - `metrics`: snapshot table and the periodic sampler
//! - `export`: the dispatcher delivering snapshots to the collector
//! - `storage`: the repository trait and its memory and relational backends
//! - `service`: merge-then-store orchestration used by the HTTP layer
//! - `receiver`: the collector's HTTP endpoints
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use runmetrics_lib::core::Config;
//! use runmetrics_lib::ServerApplication;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = ServerApplication::new(config, CancellationToken::new()).await?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod application;
pub mod cli;
pub mod core;
pub mod export;
pub mod metrics;
pub mod receiver;
pub mod service;
pub mod storage;

// Re-export core types for convenience
pub use crate::application::{AgentApplication, ServerApplication};
pub use crate::core::{Config, MetricsError, Result};
