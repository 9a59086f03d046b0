use crate::core::error::{MetricsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a metric, which decides how samples are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Instantaneous measurement, last write wins.
    Gauge,
    /// Cumulative value, new deltas are added to the stored total.
    Counter,
}

impl MetricKind {
    /// Wire and storage name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }

    /// Parse a raw literal according to this kind.
    ///
    /// Gauges accept any finite floating-point literal, counters only base-10 signed integers.
    pub fn parse_value(&self, raw: &str) -> Result<MetricValue> {
        match self {
            MetricKind::Gauge => {
                let value = raw
                    .parse::<f64>()
                    .map_err(|e| MetricsError::parse(format!("invalid gauge value {raw:?}: {e}")))?;
                if !value.is_finite() {
                    return Err(MetricsError::parse(format!("gauge value {raw:?} is not finite")));
                }
                Ok(MetricValue::Gauge(value))
            }
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|e| MetricsError::parse(format!("invalid counter delta {raw:?}: {e}"))),
        }
    }
}

impl FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetricsError::TypeNotCorrect(other.to_string())),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value carried by a metric, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(i64),
    Gauge(f64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Counter(delta) => write!(f, "{delta}"),
            MetricValue::Gauge(value) => write!(f, "{value}"),
        }
    }
}

/// A named metric as stored by a repository.
///
/// `(kind, name)` is unique within a store. `id` is assigned by the store on first insert and
/// stays stable across later merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metric {
    /// Creates a metric from a raw type name, failing with `TypeNotCorrect` for unknown types.
    pub fn new(name: impl Into<String>, kind: &str) -> Result<Self> {
        let kind = kind.parse::<MetricKind>()?;
        Ok(Self::with_kind(name, kind))
    }

    /// Creates an empty metric of a known kind.
    pub fn with_kind(name: impl Into<String>, kind: MetricKind) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            kind,
            delta: None,
            value: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shorthand for a gauge sample.
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        let mut metric = Self::with_kind(name, MetricKind::Gauge);
        metric.set_value(value);
        metric
    }

    /// Shorthand for a counter sample.
    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        let mut metric = Self::with_kind(name, MetricKind::Counter);
        metric.set_delta(delta);
        metric
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = Some(value);
    }

    pub fn set_delta(&mut self, delta: i64) {
        self.delta = Some(delta);
    }

    /// Sets whichever member matches the value's kind.
    pub fn set(&mut self, value: MetricValue) {
        match value {
            MetricValue::Counter(delta) => self.set_delta(delta),
            MetricValue::Gauge(value) => self.set_value(value),
        }
    }

    /// Adds a previously stored delta to this one. Only meaningful for counters.
    pub fn merge_delta(&mut self, prior_delta: i64) {
        self.delta = Some(self.delta.unwrap_or(0).saturating_add(prior_delta));
    }

    /// Merges this incoming sample onto the stored record `prior`.
    ///
    /// Gauges replace the prior value, counters add to the prior delta. Identity and creation
    /// time are inherited from `prior`.
    pub fn merge_from(&mut self, prior: &Metric) {
        self.id.clone_from(&prior.id);
        self.created_at = prior.created_at;
        self.updated_at = Utc::now();
        if self.kind == MetricKind::Counter {
            if let Some(prior_delta) = prior.delta {
                self.merge_delta(prior_delta);
            }
        }
    }

    /// The value matching the metric's kind, if set.
    pub fn current_value(&self) -> Option<MetricValue> {
        match self.kind {
            MetricKind::Counter => self.delta.map(MetricValue::Counter),
            MetricKind::Gauge => self.value.map(MetricValue::Gauge),
        }
    }

    /// Checks that exactly the member matching the kind is present.
    ///
    /// Gauge values must be finite, JSON has no representation for NaN or the infinities.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(MetricsError::parse("metric name cannot be empty"));
        }
        if self.value.is_some_and(|value| !value.is_finite()) {
            return Err(MetricsError::parse(format!(
                "gauge {} must carry a finite value",
                self.name
            )));
        }
        match (self.kind, self.delta, self.value) {
            (MetricKind::Counter, Some(_), None) | (MetricKind::Gauge, None, Some(_)) => Ok(()),
            (MetricKind::Counter, _, _) => Err(MetricsError::parse(format!(
                "counter {} must carry a delta and no value",
                self.name
            ))),
            (MetricKind::Gauge, _, _) => Err(MetricsError::parse(format!(
                "gauge {} must carry a value and no delta",
                self.name
            ))),
        }
    }
}

/// Formats a float with fixed precision, trimming trailing zeros and a dangling dot.
pub fn format_float(num: f64, precision: usize) -> String {
    let formatted = format!("{num:.precision$}");
    if !formatted.contains('.') {
        return formatted;
    }
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Generates a fresh process-unique metric identifier.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metric_rejects_unknown_type() {
        let err = Metric::new("x", "bogus").unwrap_err();
        assert!(matches!(err, MetricsError::TypeNotCorrect(ref t) if t == "bogus"));

        assert!(Metric::new("x", "Gauge").is_err());
        assert_eq!(Metric::new("x", "counter").unwrap().kind, MetricKind::Counter);
    }

    #[test]
    fn test_parse_value_by_kind() {
        assert_eq!(MetricKind::Gauge.parse_value("25.5").unwrap(), MetricValue::Gauge(25.5));
        assert_eq!(MetricKind::Gauge.parse_value("3").unwrap(), MetricValue::Gauge(3.0));
        assert_eq!(MetricKind::Counter.parse_value("-12").unwrap(), MetricValue::Counter(-12));

        assert!(matches!(
            MetricKind::Counter.parse_value("1.5"),
            Err(MetricsError::Parse { .. })
        ));
        assert!(matches!(
            MetricKind::Counter.parse_value("abc"),
            Err(MetricsError::Parse { .. })
        ));
        assert!(matches!(
            MetricKind::Gauge.parse_value("none"),
            Err(MetricsError::Parse { .. })
        ));
    }

    #[test]
    fn test_gauge_rejects_non_finite_values() {
        for raw in ["NaN", "nan", "inf", "-inf", "infinity", "1e400"] {
            assert!(
                matches!(MetricKind::Gauge.parse_value(raw), Err(MetricsError::Parse { .. })),
                "{raw} was accepted"
            );
        }

        assert!(Metric::gauge("Weird", f64::NAN).validate().is_err());
        assert!(Metric::gauge("Weird", f64::NEG_INFINITY).validate().is_err());
        assert!(Metric::gauge("Fine", f64::MAX).validate().is_ok());
    }

    #[test]
    fn test_counter_merge_adds_prior_delta() {
        let mut prior = Metric::counter("Hits", 5);
        prior.id = "abc".to_string();

        let mut incoming = Metric::counter("Hits", 3);
        incoming.merge_from(&prior);

        assert_eq!(incoming.delta, Some(8));
        assert_eq!(incoming.id, "abc");
        assert_eq!(incoming.created_at, prior.created_at);
    }

    #[test]
    fn test_gauge_merge_replaces_value() {
        let mut prior = Metric::gauge("Alloc", 10.0);
        prior.id = "abc".to_string();

        let mut incoming = Metric::gauge("Alloc", 2.5);
        incoming.merge_from(&prior);

        assert_eq!(incoming.value, Some(2.5));
        assert_eq!(incoming.id, "abc");
    }

    #[test]
    fn test_validate_requires_matching_member() {
        assert!(Metric::gauge("a", 1.0).validate().is_ok());
        assert!(Metric::counter("a", 1).validate().is_ok());
        assert!(Metric::with_kind("a", MetricKind::Gauge).validate().is_err());

        let mut both = Metric::counter("a", 1);
        both.set_value(1.0);
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_snapshot_record_serialization() {
        let mut metric = Metric::counter("PollCount", 4);
        metric.id = "id-1".to_string();
        let json = serde_json::to_value(&metric).unwrap();

        assert_eq!(json["id"], "id-1");
        assert_eq!(json["type"], "counter");
        assert_eq!(json["delta"], 4);
        assert!(json.get("value").is_none());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());

        let back: Metric = serde_json::from_value(json).unwrap();
        assert_eq!(back, metric);
    }

    #[test]
    fn test_format_float() {
        let cases = [
            (150112.000, 3, "150112"),
            (3.833856e+06, 2, "3833856"),
            (-13.0, 3, "-13"),
            (7.70766, 4, "7.7077"),
            (282.0, 3, "282"),
            (3485734.100, 3, "3485734.1"),
            (-3.35872e+06, 5, "-3358720"),
            (0.0, 2, "0"),
            (150.0, 0, "150"),
        ];
        for (num, precision, expected) in cases {
            assert_eq!(format_float(num, precision), expected, "format_float({num}, {precision})");
        }
    }

    #[test]
    fn test_generate_id_is_unique() {
        let a = generate_id();
        let b = generate_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
