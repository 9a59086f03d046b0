//! Encoding of one snapshot field into a compressed, optionally signed request body.

use crate::core::{MetricValue, Result, Signer};
use crate::service::dto::MetricRequest;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// A ready to send request body.
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    /// Metric name, used for logging only.
    pub name: String,
    /// Gzip-compressed JSON body.
    pub body: Vec<u8>,
    /// Base64 HMAC-SHA-256 of `body`, when a key is configured.
    pub signature: Option<String>,
}

/// Builds the JSON document for one field, compresses it and signs the compressed bytes.
pub fn encode(name: &str, value: MetricValue, signer: Option<&Signer>) -> Result<EncodedPayload> {
    let request = match value {
        MetricValue::Gauge(value) => MetricRequest::gauge(name, value),
        MetricValue::Counter(delta) => MetricRequest::counter(name, delta),
    };

    let json = serde_json::to_vec(&request)?;
    let body = gzip(&json)?;
    let signature = signer.map(|signer| signer.sign(&body));

    Ok(EncodedPayload {
        name: name.to_string(),
        body,
        signature,
    })
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len()), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
