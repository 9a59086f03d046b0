//! Repository trait implemented by every storage backend.

use crate::core::{Metric, MetricKind, Result};

/// Trait for storage backend implementations.
///
/// Implementations own the merge rule: gauges replace the stored value, counters add the
/// incoming delta to the stored one. `(kind, name)` is unique and the identifier assigned on
/// first insert never changes afterwards.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    /// Merge one metric into the store, returning the stored record.
    async fn save_or_update(&self, metric: Metric) -> Result<Metric>;

    /// Merge a batch in input order. Either every metric is applied or none is.
    async fn save_or_update_many(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>>;

    /// Look up a single metric, failing with `NotFound` when absent.
    async fn find_one_by_type_and_name(&self, kind: MetricKind, name: &str) -> Result<Metric>;

    /// All stored metrics ordered by kind and name.
    async fn find_all(&self) -> Result<Vec<Metric>>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()>;
}
