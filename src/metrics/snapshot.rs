use crate::core::{MetricKind, MetricValue};
use chrono::{DateTime, Utc};

/// One immutable bundle of sampled values, captured at a single point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    /// Resident set size of this process, in bytes.
    pub alloc: f64,
    /// Virtual memory of this process, in bytes.
    pub virtual_memory: f64,
    /// CPU usage of this process, in percent of one core.
    pub process_cpu: f64,
    /// Seconds since this process started.
    pub run_time: f64,
    pub disk_read_bytes: f64,
    pub disk_written_bytes: f64,
    pub total_memory: f64,
    pub free_memory: f64,
    pub available_memory: f64,
    pub used_memory: f64,
    pub total_swap: f64,
    pub free_swap: f64,
    pub load_average1: f64,
    /// Average utilization over all CPUs, in percent.
    pub cpu_utilization1: f64,
    /// Number of samples taken by this process so far.
    pub poll_count: i64,
    /// Fresh random value in `[0, 1)` per sample.
    pub random_value: f64,
    /// Capture time. Not a metric, never delivered.
    pub sampled_at: DateTime<Utc>,
}

impl Default for MetricSnapshot {
    fn default() -> Self {
        Self {
            alloc: 0.0,
            virtual_memory: 0.0,
            process_cpu: 0.0,
            run_time: 0.0,
            disk_read_bytes: 0.0,
            disk_written_bytes: 0.0,
            total_memory: 0.0,
            free_memory: 0.0,
            available_memory: 0.0,
            used_memory: 0.0,
            total_swap: 0.0,
            free_swap: 0.0,
            load_average1: 0.0,
            cpu_utilization1: 0.0,
            poll_count: 0,
            random_value: 0.0,
            sampled_at: Utc::now(),
        }
    }
}

/// A named, typed accessor into [`MetricSnapshot`].
#[derive(Clone, Copy)]
pub struct SnapshotField {
    pub name: &'static str,
    pub kind: MetricKind,
    read: fn(&MetricSnapshot) -> MetricValue,
}

impl SnapshotField {
    const fn gauge(name: &'static str, read: fn(&MetricSnapshot) -> MetricValue) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            read,
        }
    }

    const fn counter(name: &'static str, read: fn(&MetricSnapshot) -> MetricValue) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            read,
        }
    }

    /// Reads this field from a snapshot.
    pub fn value(&self, snapshot: &MetricSnapshot) -> MetricValue {
        (self.read)(snapshot)
    }
}

impl std::fmt::Debug for SnapshotField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotField")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Every delivered field of [`MetricSnapshot`], in delivery order.
pub static FIELDS: &[SnapshotField] = &[
    SnapshotField::gauge("Alloc", |s| MetricValue::Gauge(s.alloc)),
    SnapshotField::gauge("VirtualMemory", |s| MetricValue::Gauge(s.virtual_memory)),
    SnapshotField::gauge("ProcessCPU", |s| MetricValue::Gauge(s.process_cpu)),
    SnapshotField::gauge("RunTime", |s| MetricValue::Gauge(s.run_time)),
    SnapshotField::gauge("DiskReadBytes", |s| MetricValue::Gauge(s.disk_read_bytes)),
    SnapshotField::gauge("DiskWrittenBytes", |s| MetricValue::Gauge(s.disk_written_bytes)),
    SnapshotField::gauge("TotalMemory", |s| MetricValue::Gauge(s.total_memory)),
    SnapshotField::gauge("FreeMemory", |s| MetricValue::Gauge(s.free_memory)),
    SnapshotField::gauge("AvailableMemory", |s| MetricValue::Gauge(s.available_memory)),
    SnapshotField::gauge("UsedMemory", |s| MetricValue::Gauge(s.used_memory)),
    SnapshotField::gauge("TotalSwap", |s| MetricValue::Gauge(s.total_swap)),
    SnapshotField::gauge("FreeSwap", |s| MetricValue::Gauge(s.free_swap)),
    SnapshotField::gauge("LoadAverage1", |s| MetricValue::Gauge(s.load_average1)),
    SnapshotField::gauge("CPUutilization1", |s| MetricValue::Gauge(s.cpu_utilization1)),
    SnapshotField::counter("PollCount", |s| MetricValue::Counter(s.poll_count)),
    SnapshotField::gauge("RandomValue", |s| MetricValue::Gauge(s.random_value)),
];

impl MetricSnapshot {
    /// Iterates `(name, value)` over every delivered field.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, MetricValue)> + '_ {
        FIELDS.iter().map(move |field| (field.name, field.value(self)))
    }
}
