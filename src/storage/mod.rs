//! Storage backends for metrics.
//!
//! Both backends implement [`Repository`]. The backend is chosen once at startup
//! from configuration and never changes while the process runs.

use crate::core::config::{StorageBackendKind, StorageConfig};
use crate::core::{Result, RetryConfig};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod backend;
pub mod memory;
pub mod relational;

// Re-export commonly used types
pub use backend::Repository;
pub use memory::{MemoryStore, MemoryStoreOptions};
pub use relational::RelationalStore;

/// An opened backend together with its background flush task, if any.
pub struct StorageHandle {
    /// Backend shared with the service layer.
    pub repository: Arc<dyn Repository>,
    /// Periodic snapshot task, finishes after its final flush once cancelled.
    pub flusher: Option<JoinHandle<()>>,
}

/// Opens the configured backend.
///
/// For the memory backend with a positive store interval the periodic flush task is spawned
/// on `cancel` as well.
pub async fn open_repository(
    config: &StorageConfig,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<StorageHandle> {
    match config.backend {
        StorageBackendKind::Memory => {
            let options = MemoryStoreOptions {
                file_storage_path: Some(config.file_storage_path.clone()),
                store_interval: config.store_interval,
                restore: config.restore,
            };
            let store = Arc::new(MemoryStore::open(options, retry.clone(), cancel.clone()).await);
            let flusher = Arc::clone(&store).spawn_flusher();
            Ok(StorageHandle {
                repository: store,
                flusher,
            })
        }
        StorageBackendKind::Relational => {
            let url = config.database_url.as_deref().unwrap_or_default();
            let store =
                RelationalStore::connect(url, config.max_connections, retry.clone(), cancel.clone())
                    .await?;
            Ok(StorageHandle {
                repository: Arc::new(store),
                flusher: None,
            })
        }
    }
}
