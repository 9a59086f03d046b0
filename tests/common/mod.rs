//! Common test utilities and fixtures.

#![allow(dead_code)]

use flate2::read::GzDecoder;
use runmetrics_lib::core::{Metric, RetryConfig};
use runmetrics_lib::storage::{MemoryStore, MemoryStoreOptions};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A small mixed set of gauges and counters.
pub fn sample_metrics() -> Vec<Metric> {
    vec![
        Metric::gauge("Alloc", 1024.0),
        Metric::gauge("RandomValue", 0.25),
        Metric::counter("PollCount", 3),
        Metric::counter("Requests", 10),
    ]
}

/// Retry policy with short delays so failing tests finish quickly.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Opens a memory store persisting to `path`.
pub async fn file_store(path: &Path, store_interval: Duration, restore: bool) -> MemoryStore {
    let options = MemoryStoreOptions {
        file_storage_path: Some(path.to_path_buf()),
        store_interval,
        restore,
    };
    MemoryStore::open(options, fast_retry(), CancellationToken::new()).await
}

/// Decompresses a gzip body into a string.
pub fn gunzip(data: &[u8]) -> String {
    let mut out = String::new();
    GzDecoder::new(data).read_to_string(&mut out).unwrap();
    out
}
