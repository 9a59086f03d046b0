//! Wire types of the collector API.

use crate::core::{Metric, MetricKind, MetricsError, Result};
use serde::{Deserialize, Serialize};

/// Inbound metric sample. `id` carries the metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRequest {
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            id: name.into(),
            kind: MetricKind::Gauge.to_string(),
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            id: name.into(),
            kind: MetricKind::Counter.to_string(),
            delta: Some(delta),
            value: None,
        }
    }

    /// Converts into a model metric.
    ///
    /// Fails with `TypeNotCorrect` for an unknown type and with `Parse` when neither a delta
    /// nor a value is present or the present one does not match the type.
    pub fn into_metric(self) -> Result<Metric> {
        if self.delta.is_none() && self.value.is_none() {
            return Err(MetricsError::parse(format!("metric {} carries no value", self.id)));
        }

        let mut metric = Metric::new(self.id, &self.kind)?;
        if let Some(delta) = self.delta {
            metric.set_delta(delta);
        }
        if let Some(value) = self.value {
            metric.set_value(value);
        }

        metric.validate()?;
        Ok(metric)
    }
}

/// Outbound view of a stored metric, `id` is the metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl From<Metric> for MetricResponse {
    fn from(metric: Metric) -> Self {
        Self {
            id: metric.name,
            kind: metric.kind,
            delta: metric.delta,
            value: metric.value,
        }
    }
}

/// Lookup by name and type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_without_values_is_rejected() {
        let request = MetricRequest {
            id: "Alloc".to_string(),
            kind: "gauge".to_string(),
            delta: None,
            value: None,
        };
        assert!(matches!(request.into_metric(), Err(MetricsError::Parse { .. })));
    }

    #[test]
    fn test_request_with_unknown_type() {
        let request = MetricRequest {
            id: "Alloc".to_string(),
            kind: "histogram".to_string(),
            delta: None,
            value: Some(1.0),
        };
        assert!(matches!(request.into_metric(), Err(MetricsError::TypeNotCorrect(_))));
    }

    #[test]
    fn test_request_with_mismatched_member() {
        let request = MetricRequest {
            id: "PollCount".to_string(),
            kind: "counter".to_string(),
            delta: None,
            value: Some(1.0),
        };
        assert!(matches!(request.into_metric(), Err(MetricsError::Parse { .. })));
    }

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_string(&MetricRequest::counter("PollCount", 3)).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":3}"#);

        let json = serde_json::to_string(&MetricRequest::gauge("Alloc", 1.5)).unwrap();
        assert_eq!(json, r#"{"id":"Alloc","type":"gauge","value":1.5}"#);
    }

    #[test]
    fn test_response_uses_name_as_id() {
        let mut metric = Metric::gauge("Alloc", 2.0);
        metric.id = "generated".to_string();

        let response = MetricResponse::from(metric);
        assert_eq!(response.id, "Alloc");
        assert_eq!(response.value, Some(2.0));
    }
}
