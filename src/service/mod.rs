//! Metric service: merge-then-store and read-back queries over a [`Repository`].
//!
//! The HTTP layer talks to the store exclusively through [`MetricsService`]. Errors keep
//! their kind so callers can tell `TypeNotCorrect`, `Parse` and `NotFound` apart.

pub mod dto;

use crate::core::types::format_float;
use crate::core::{Metric, MetricKind, MetricValue, Result};
use crate::storage::Repository;
use dto::MetricResponse;
use std::sync::Arc;

/// Precision of gauge values in the HTML listing.
const HTML_PRECISION: usize = 3;

/// Service facade over the configured storage backend.
#[derive(Clone)]
pub struct MetricsService {
    repository: Arc<dyn Repository>,
}

impl MetricsService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Stores a sample given as raw path segments.
    ///
    /// The type is checked before the value, so an unknown type wins over a bad literal.
    pub async fn create_or_update_by_params(
        &self,
        kind: &str,
        name: &str,
        raw_value: &str,
    ) -> Result<Metric> {
        let kind = kind.parse::<MetricKind>()?;
        let value = kind.parse_value(raw_value)?;

        let mut metric = Metric::with_kind(name, kind);
        metric.set(value);
        self.create_or_update(metric).await
    }

    /// Merges one metric into the store and returns the stored record.
    pub async fn create_or_update(&self, metric: Metric) -> Result<Metric> {
        tracing::debug!(kind = %metric.kind, name = %metric.name, "Storing metric");
        self.repository.save_or_update(metric).await
    }

    /// Merges a batch, all or nothing.
    pub async fn create_or_update_many(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>> {
        tracing::debug!(count = metrics.len(), "Storing metric batch");
        self.repository.save_or_update_many(metrics).await
    }

    pub async fn get_metric(&self, kind: &str, name: &str) -> Result<MetricResponse> {
        let kind = kind.parse::<MetricKind>()?;
        let metric = self.repository.find_one_by_type_and_name(kind, name).await?;
        Ok(metric.into())
    }

    /// The stored delta or value matching the metric's type.
    pub async fn get_metric_value(&self, kind: &str, name: &str) -> Result<MetricValue> {
        let kind = kind.parse::<MetricKind>()?;
        let metric = self.repository.find_one_by_type_and_name(kind, name).await?;
        Ok(metric.current_value().unwrap_or(match kind {
            MetricKind::Counter => MetricValue::Counter(0),
            MetricKind::Gauge => MetricValue::Gauge(0.0),
        }))
    }

    /// Checks that the storage backend is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.repository.ping().await
    }

    /// Renders every stored metric as an HTML list.
    pub async fn get_all_as_html(&self) -> Result<String> {
        let metrics = self.repository.find_all().await?;

        let mut html = String::from(
            "<html><head><title>Metric Values</title></head><body><h1>Metric Values:</h1><ul>",
        );
        for metric in &metrics {
            let value = match metric.current_value() {
                Some(MetricValue::Gauge(value)) => format_float(value, HTML_PRECISION),
                Some(MetricValue::Counter(delta)) => delta.to_string(),
                None => String::new(),
            };
            html.push_str(&format!(
                "<li><strong>{}: </strong>Guid: {}\tValue: {}</li>",
                escape_html(&metric.name),
                escape_html(&metric.id),
                value
            ));
        }
        html.push_str("</ul></body></html>");

        Ok(html)
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MetricsError;
    use crate::storage::MemoryStore;

    fn service() -> MetricsService {
        MetricsService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_params_error_kinds() {
        let service = service();

        let err = service.create_or_update_by_params("bogus", "x", "1").await.unwrap_err();
        assert!(matches!(err, MetricsError::TypeNotCorrect(_)));

        let err = service.create_or_update_by_params("counter", "x", "abc").await.unwrap_err();
        assert!(matches!(err, MetricsError::Parse { .. }));

        let err = service.create_or_update_by_params("counter", "x", "1.5").await.unwrap_err();
        assert!(matches!(err, MetricsError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_non_finite_gauge_is_not_stored() {
        let service = service();

        let err = service.create_or_update_by_params("gauge", "Weird", "NaN").await.unwrap_err();
        assert!(matches!(err, MetricsError::Parse { .. }));

        let err = service.create_or_update(Metric::gauge("Weird", f64::INFINITY)).await.unwrap_err();
        assert!(matches!(err, MetricsError::Parse { .. }));

        assert!(service.get_metric("gauge", "Weird").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_ping_memory_store() {
        assert!(service().ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_counter_is_counted_once_per_update() {
        let service = service();
        service.create_or_update_by_params("counter", "Hits", "5").await.unwrap();
        service.create_or_update_by_params("counter", "Hits", "3").await.unwrap();

        let value = service.get_metric_value("counter", "Hits").await.unwrap();
        assert_eq!(value, MetricValue::Counter(8));
        assert_eq!(value.to_string(), "8");
    }

    #[tokio::test]
    async fn test_get_metric_response() {
        let service = service();
        service.create_or_update_by_params("gauge", "Alloc", "12.5").await.unwrap();

        let response = service.get_metric("gauge", "Alloc").await.unwrap();
        assert_eq!(response.id, "Alloc");
        assert_eq!(response.kind, MetricKind::Gauge);
        assert_eq!(response.value, Some(12.5));
        assert_eq!(response.delta, None);

        let err = service.get_metric("counter", "Alloc").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_html_listing() {
        let service = service();
        service.create_or_update_by_params("gauge", "Alloc", "7.70766").await.unwrap();
        service.create_or_update_by_params("counter", "<Poll>", "2").await.unwrap();

        let html = service.get_all_as_html().await.unwrap();
        assert!(html.starts_with("<html>"));
        assert!(html.ends_with("</ul></body></html>"));
        assert!(html.contains("<strong>Alloc: </strong>Guid: "));
        assert!(html.contains("Value: 7.708</li>"));
        assert!(html.contains("<strong>&lt;Poll&gt;: </strong>"));
        assert!(html.contains("Value: 2</li>"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
    }
}
