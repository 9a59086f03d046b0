//! Delivery tests against a mock collector.

mod common;

use common::gunzip;
use runmetrics_lib::core::sign::SIGNATURE_HEADER;
use runmetrics_lib::core::Signer;
use runmetrics_lib::export::{Dispatcher, HttpTransport};
use runmetrics_lib::metrics::{MetricSnapshot, FIELDS};
use runmetrics_lib::service::dto::MetricRequest;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dispatcher(server: &MockServer, signer: Option<Signer>) -> Dispatcher {
    let transport = HttpTransport::new(&server.uri(), Duration::from_secs(5)).unwrap();
    Dispatcher::new(Arc::new(transport), signer, 3, Duration::from_secs(10))
}

#[tokio::test]
async fn test_every_field_is_posted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update/"))
        .and(header("Content-Type", "application/json"))
        .and(header("Content-Encoding", "gzip"))
        .respond_with(ResponseTemplate::new(200))
        .expect(FIELDS.len() as u64)
        .mount(&server)
        .await;

    let snapshot = MetricSnapshot {
        poll_count: 7,
        random_value: 0.5,
        ..MetricSnapshot::default()
    };
    let report = dispatcher(&server, None)
        .deliver(&snapshot, &CancellationToken::new())
        .await;

    assert_eq!(report.attempted, FIELDS.len());
    assert_eq!(report.delivered, FIELDS.len());
    assert_eq!(report.failed, 0);

    let requests = server.received_requests().await.unwrap();
    let bodies: Vec<MetricRequest> = requests
        .iter()
        .map(|request| serde_json::from_str(&gunzip(&request.body)).unwrap())
        .collect();

    let poll_count = bodies.iter().find(|b| b.id == "PollCount").unwrap();
    assert_eq!(poll_count.kind, "counter");
    assert_eq!(poll_count.delta, Some(7));
    assert_eq!(poll_count.value, None);

    let random = bodies.iter().find(|b| b.id == "RandomValue").unwrap();
    assert_eq!(random.kind, "gauge");
    assert_eq!(random.value, Some(0.5));

    assert!(requests.iter().all(|r| r.headers.get(SIGNATURE_HEADER).is_none()));
}

#[tokio::test]
async fn test_payloads_are_signed_over_compressed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let signer = Signer::new("secret");
    dispatcher(&server, Some(signer.clone()))
        .deliver(&MetricSnapshot::default(), &CancellationToken::new())
        .await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), FIELDS.len());
    for request in &requests {
        let signature = request.headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
        assert!(signer.verify(signature, &request.body));
    }
}

#[tokio::test]
async fn test_server_errors_are_counted_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(FIELDS.len() as u64)
        .mount(&server)
        .await;

    let report = dispatcher(&server, None)
        .deliver(&MetricSnapshot::default(), &CancellationToken::new())
        .await;

    assert_eq!(report.attempted, FIELDS.len());
    assert_eq!(report.failed, FIELDS.len());
    assert_eq!(report.delivered, 0);
}
