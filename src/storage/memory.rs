//! In-memory storage backend with JSON file snapshots.
//!
//! Metrics live in a map from generated identifier to record, guarded by a single
//! reader/writer lock, with a secondary index on `(kind, name)`. The whole map can be
//! written to a snapshot file and restored from it on startup.

use super::Repository;
use crate::core::retry::{retry_with_backoff, RetryConfig};
use crate::core::types::generate_id;
use crate::core::{Metric, MetricKind, MetricsError, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, DirBuilder, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Snapshot settings of a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreOptions {
    /// Snapshot file, persistence is disabled when absent.
    pub file_storage_path: Option<PathBuf>,
    /// Flush period. Zero persists synchronously after every mutation.
    pub store_interval: Duration,
    /// Load the snapshot file when opening the store.
    pub restore: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    by_id: HashMap<String, Metric>,
    index: HashMap<(MetricKind, String), String>,
}

impl StoreState {
    /// Merges `metric` onto any stored record with the same kind and name.
    fn apply(&mut self, mut metric: Metric) -> Metric {
        let key = (metric.kind, metric.name.clone());

        match self.index.get(&key).and_then(|id| self.by_id.get(id)) {
            Some(prior) => metric.merge_from(prior),
            None => {
                let now = Utc::now();
                metric.id = generate_id();
                metric.created_at = now;
                metric.updated_at = now;
            }
        }

        self.index.insert(key, metric.id.clone());
        self.by_id.insert(metric.id.clone(), metric.clone());
        metric
    }

    fn find(&self, kind: MetricKind, name: &str) -> Option<&Metric> {
        self.index
            .get(&(kind, name.to_string()))
            .and_then(|id| self.by_id.get(id))
    }

    /// Rebuilds the state from a snapshot, skipping records that violate the model.
    fn from_snapshot(records: HashMap<String, Metric>) -> Self {
        let mut state = Self::default();

        for (id, mut metric) in records {
            if let Err(e) = metric.validate() {
                tracing::warn!(id = %id, "Skipping invalid snapshot record: {}", e);
                continue;
            }

            let key = (metric.kind, metric.name.clone());
            if state.index.contains_key(&key) {
                tracing::warn!(id = %id, kind = %metric.kind, name = %metric.name, "Skipping duplicate snapshot record");
                continue;
            }

            metric.id.clone_from(&id);
            state.index.insert(key, id.clone());
            state.by_id.insert(id, metric);
        }

        state
    }
}

/// In-memory metric store with optional crash-safe file snapshots.
pub struct MemoryStore {
    state: RwLock<StoreState>,
    // Serializes snapshot writes so a stale snapshot never lands after a newer one.
    flush_lock: tokio::sync::Mutex<()>,
    options: MemoryStoreOptions,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl MemoryStore {
    /// Create a store without any persistence.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            options: MemoryStoreOptions::default(),
            retry: RetryConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Open a store, restoring the snapshot file first when requested.
    ///
    /// A missing or unreadable snapshot is logged and the store starts empty.
    pub async fn open(
        options: MemoryStoreOptions,
        retry: RetryConfig,
        cancel: CancellationToken,
    ) -> Self {
        let mut state = StoreState::default();

        if options.restore {
            if let Some(path) = options.file_storage_path.as_deref() {
                if let Some(restored) = load_snapshot(path, &retry, &cancel).await {
                    state = restored;
                }
            }
        }

        Self {
            state: RwLock::new(state),
            flush_lock: tokio::sync::Mutex::new(()),
            options,
            retry,
            cancel,
        }
    }

    /// Number of stored metrics.
    pub fn len(&self) -> usize {
        self.state.read().by_id.len()
    }

    /// Whether the store holds no metrics.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the whole map to the snapshot file, replacing it atomically.
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = self.options.file_storage_path.as_deref() else {
            return Ok(());
        };

        let _guard = self.flush_lock.lock().await;
        let (bytes, count) = {
            let state = self.state.read();
            (serde_json::to_vec(&state.by_id)?, state.by_id.len())
        };

        let data = bytes.as_slice();
        retry_with_backoff(&self.retry, &self.cancel, move || write_snapshot(path, data)).await?;

        tracing::debug!(path = %path.display(), metrics = count, "Snapshot flushed");
        Ok(())
    }

    /// Spawn the periodic flush task.
    ///
    /// Returns `None` when there is no snapshot file or the store persists synchronously.
    /// The task flushes once more after cancellation and then exits.
    pub fn spawn_flusher(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.options.store_interval;
        if self.options.file_storage_path.is_none() || period.is_zero() {
            return None;
        }

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.flush().await {
                            tracing::error!("Periodic snapshot flush failed: {}", e);
                        }
                    }
                    () = self.cancel.cancelled() => break,
                }
            }

            if let Err(e) = self.flush().await {
                tracing::error!("Final snapshot flush failed: {}", e);
            }
            tracing::info!("Snapshot flusher stopped");
        }))
    }

    fn persists_synchronously(&self) -> bool {
        self.options.file_storage_path.is_some() && self.options.store_interval.is_zero()
    }

    /// In synchronous mode a failed write is logged and the in-memory merge stands.
    async fn persist_if_synchronous(&self) {
        if self.persists_synchronously() {
            if let Err(e) = self.flush().await {
                tracing::error!("Synchronous snapshot flush failed: {}", e);
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Repository for MemoryStore {
    async fn save_or_update(&self, metric: Metric) -> Result<Metric> {
        metric.validate()?;
        let stored = self.state.write().apply(metric);
        self.persist_if_synchronous().await;
        Ok(stored)
    }

    async fn save_or_update_many(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>> {
        // Validate the whole batch up front so a bad entry leaves no partial writes behind.
        for metric in &metrics {
            metric.validate()?;
        }

        let stored = {
            let mut state = self.state.write();
            metrics.into_iter().map(|metric| state.apply(metric)).collect()
        };
        self.persist_if_synchronous().await;
        Ok(stored)
    }

    async fn find_one_by_type_and_name(&self, kind: MetricKind, name: &str) -> Result<Metric> {
        self.state
            .read()
            .find(kind, name)
            .cloned()
            .ok_or_else(|| MetricsError::not_found(kind, name))
    }

    async fn find_all(&self) -> Result<Vec<Metric>> {
        let mut metrics: Vec<Metric> = self.state.read().by_id.values().cloned().collect();
        metrics.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
        Ok(metrics)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

async fn load_snapshot(
    path: &Path,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Option<StoreState> {
    let read = retry_with_backoff(retry, cancel, move || async move {
        fs::read(path).await.map_err(MetricsError::from)
    })
    .await;

    let bytes = match read {
        Ok(bytes) => bytes,
        Err(MetricsError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No snapshot to restore, starting empty");
            return None;
        }
        Err(e) => {
            tracing::error!(path = %path.display(), "Failed to read snapshot, starting empty: {}", e);
            return None;
        }
    };

    match serde_json::from_slice::<HashMap<String, Metric>>(&bytes) {
        Ok(records) => {
            let state = StoreState::from_snapshot(records);
            tracing::info!(path = %path.display(), metrics = state.by_id.len(), "Snapshot restored");
            Some(state)
        }
        Err(e) => {
            tracing::error!(path = %path.display(), "Corrupt snapshot, starting empty: {}", e);
            None
        }
    }
}

/// Writes to a sibling temp file and renames it over `path`.
async fn write_snapshot(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            DirBuilder::new().recursive(true).create(parent).await?;
        }
    }

    let tmp = temp_path(path);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
