//! SQL storage backend on top of a `sqlx` SQLite pool.

use super::Repository;
use crate::core::retry::{retry_with_backoff, RetryConfig};
use crate::core::types::generate_id;
use crate::core::{Metric, MetricKind, MetricsError, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Connection, Pool, Row, Sqlite, SqliteConnection};
use std::str::FromStr;
use tokio::fs::DirBuilder;
use tokio_util::sync::CancellationToken;

const SELECT_BY_TYPE_AND_NAME: &str = "SELECT id, name, type, delta, value, created_at, updated_at \
     FROM metrics WHERE type = ? AND name = ?";

const SELECT_ALL: &str =
    "SELECT id, name, type, delta, value, created_at, updated_at FROM metrics";

// Single statement upserts keep the first write of a `(type, name)` race free; the unique
// index on `(type, name)` is the conflict target.
const UPSERT_COUNTER: &str = "INSERT INTO metrics (id, name, type, delta, value, created_at, updated_at) \
     VALUES (?1, ?2, 'counter', ?3, NULL, ?4, ?4) \
     ON CONFLICT (type, name) DO UPDATE SET \
         delta = CASE \
             WHEN excluded.delta > 0 THEN CASE \
                 WHEN COALESCE(metrics.delta, 0) > ?5 - excluded.delta THEN ?5 \
                 ELSE COALESCE(metrics.delta, 0) + excluded.delta END \
             ELSE CASE \
                 WHEN COALESCE(metrics.delta, 0) < ?6 - excluded.delta THEN ?6 \
                 ELSE COALESCE(metrics.delta, 0) + excluded.delta END \
         END, \
         value = NULL, \
         updated_at = excluded.updated_at \
     RETURNING id, name, type, delta, value, created_at, updated_at";

const UPSERT_GAUGE: &str = "INSERT INTO metrics (id, name, type, delta, value, created_at, updated_at) \
     VALUES (?1, ?2, 'gauge', NULL, ?3, ?4, ?4) \
     ON CONFLICT (type, name) DO UPDATE SET \
         value = excluded.value, \
         delta = NULL, \
         updated_at = excluded.updated_at \
     RETURNING id, name, type, delta, value, created_at, updated_at";

/// Relational metric store.
///
/// Every operation runs under the retry policy. Batches run in one transaction.
pub struct RelationalStore {
    pool: Pool<Sqlite>,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl RelationalStore {
    /// Opens (creating when missing) the database at `url` and applies the embedded migrations.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        retry: RetryConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        if !in_memory {
            create_database_directory(options.get_filename()).await?;
            // Readers do not block the single writer in WAL mode.
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to an in-memory database sees its own database, so the pool is
        // pinned to a single connection that is never recycled.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(url, "Relational store ready");
        Ok(Self::from_pool(pool, retry, cancel))
    }

    /// Wraps an already migrated pool.
    pub fn from_pool(pool: Pool<Sqlite>, retry: RetryConfig, cancel: CancellationToken) -> Self {
        Self {
            pool,
            retry,
            cancel,
        }
    }

    /// Close the pool, waiting for checked out connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn save_once(&self, metric: Metric) -> Result<Metric> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, metric).await
    }

    async fn save_batch_once(&self, metrics: &[Metric]) -> Result<Vec<Metric>> {
        let mut tx = self.pool.begin().await?;

        let mut stored = Vec::with_capacity(metrics.len());
        for metric in metrics {
            stored.push(upsert(&mut tx, metric.clone()).await?);
        }

        tx.commit().await?;
        Ok(stored)
    }
}

#[async_trait::async_trait]
impl Repository for RelationalStore {
    async fn save_or_update(&self, metric: Metric) -> Result<Metric> {
        metric.validate()?;
        retry_with_backoff(&self.retry, &self.cancel, move || {
            let metric = metric.clone();
            async move { self.save_once(metric).await }
        })
        .await
    }

    async fn save_or_update_many(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>> {
        for metric in &metrics {
            metric.validate()?;
        }

        let batch = metrics.as_slice();
        retry_with_backoff(&self.retry, &self.cancel, move || self.save_batch_once(batch)).await
    }

    async fn find_one_by_type_and_name(&self, kind: MetricKind, name: &str) -> Result<Metric> {
        let row = retry_with_backoff(&self.retry, &self.cancel, move || async move {
            sqlx::query(SELECT_BY_TYPE_AND_NAME)
                .bind(kind.as_str())
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(MetricsError::from)
        })
        .await?;

        match row {
            Some(row) => metric_from_row(&row),
            None => Err(MetricsError::not_found(kind, name)),
        }
    }

    async fn find_all(&self) -> Result<Vec<Metric>> {
        let rows = retry_with_backoff(&self.retry, &self.cancel, move || async move {
            sqlx::query(SELECT_ALL)
                .fetch_all(&self.pool)
                .await
                .map_err(MetricsError::from)
        })
        .await?;

        let mut metrics = rows.iter().map(metric_from_row).collect::<Result<Vec<_>>>()?;
        metrics.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
        Ok(metrics)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }
}

/// Inserts a new row or merges onto the existing `(type, name)` row in one statement.
///
/// Counters saturate at the `i64` bounds, the same as the in-memory merge.
async fn upsert(conn: &mut SqliteConnection, metric: Metric) -> Result<Metric> {
    let query = match metric.kind {
        MetricKind::Counter => sqlx::query(UPSERT_COUNTER)
            .bind(generate_id())
            .bind(&metric.name)
            .bind(metric.delta)
            .bind(Utc::now())
            .bind(i64::MAX)
            .bind(i64::MIN),
        MetricKind::Gauge => sqlx::query(UPSERT_GAUGE)
            .bind(generate_id())
            .bind(&metric.name)
            .bind(metric.value)
            .bind(Utc::now()),
    };

    let row = query.fetch_one(&mut *conn).await?;
    metric_from_row(&row)
}

fn metric_from_row(row: &SqliteRow) -> Result<Metric> {
    let kind: String = row.try_get("type")?;

    Ok(Metric {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: kind.parse()?,
        delta: row.try_get("delta")?,
        value: row.try_get("value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn create_database_directory(path: &std::path::Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    if !parent.as_os_str().is_empty() && !parent.exists() {
        tracing::debug!("creating directory for database file: {}", parent.display());
        DirBuilder::new().recursive(true).create(parent).await?;
    }

    Ok(())
}
