//! Process and host metric sampling.
//!
//! [`MetricSnapshot`] is the fixed set of sampled fields, enumerated through the static
//! [`FIELDS`] table. [`Sampler`] captures one snapshot per poll period and hands it to
//! the dispatcher over a bounded channel.

pub mod sampler;
pub mod snapshot;

pub use sampler::Sampler;
pub use snapshot::{MetricSnapshot, SnapshotField, FIELDS};
