//! Retry policy for transient storage errors.
//!
//! Errors are classified as transient (connection-level database failures, injected test
//! faults, file permission/existence errors) or fatal. Transient failures are retried after
//! `(attempt + 2) * base_delay`, capped at `max_delay`, up to `max_attempts` attempts in total.

use crate::core::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// SQLSTATE class for connection exceptions.
const SQLSTATE_CONNECTION_EXCEPTION: &str = "08";
/// Primary SQLite result codes for a busy or locked database.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for transient errors
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound for a single wait
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Decides whether an error deserves another attempt.
pub trait RetryPolicy {
    /// Returns the base delay for a retriable error, `None` for fatal ones.
    fn retry_delay(&self, error: &MetricsError) -> Option<Duration>;
}

impl RetryPolicy for RetryConfig {
    fn retry_delay(&self, error: &MetricsError) -> Option<Duration> {
        is_retriable(error).then_some(self.base_delay)
    }
}

impl RetryConfig {
    /// Wait before the next attempt after `attempt` attempts have failed.
    pub fn backoff(&self, attempt: u32, base: Duration) -> Duration {
        base.saturating_mul(attempt.saturating_add(2)).min(self.max_delay)
    }
}

/// Pure classification of transient errors.
pub fn is_retriable(error: &MetricsError) -> bool {
    match error {
        MetricsError::Database(err) => is_connection_error(err),
        MetricsError::InjectedFault(_) => true,
        MetricsError::Io(err) => is_file_permission_error(err),
        _ => false,
    }
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| {
            if code.starts_with(SQLSTATE_CONNECTION_EXCEPTION) {
                return true;
            }
            // SQLite reports extended result codes, the primary code sits in the low byte.
            code.parse::<i64>()
                .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false)
        }),
        _ => false,
    }
}

fn is_file_permission_error(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::PermissionDenied | io::ErrorKind::AlreadyExists)
}

/// Execute an operation, retrying transient failures.
///
/// Aborts immediately on a fatal error, once `max_attempts` is reached, or with
/// [`MetricsError::Cancelled`] when `cancel` fires during a wait.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        let Some(base) = config.retry_delay(&error) else {
            tracing::debug!(attempt, category = error.category(), "non-retriable error: {}", error);
            return Err(error);
        };

        if attempt >= config.max_attempts {
            tracing::warn!("Operation failed after {} attempts: {}", attempt, error);
            return Err(error);
        }

        let backoff = config.backoff(attempt, base);
        tracing::debug!(attempt, ?backoff, "retriable error, retrying: {}", error);

        tokio::select! {
            () = sleep(backoff) => {},
            () = cancel.cancelled() => return Err(MetricsError::Cancelled),
        }
    }
}
