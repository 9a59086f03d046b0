//! HTTP endpoints of the collector.
//!
//! Thin adapter over [`MetricsService`]: it decodes requests, verifies signatures,
//! decompresses bodies and maps errors to status codes. No merge logic lives here.

use crate::core::sign::SIGNATURE_HEADER;
use crate::core::{MetricsError, Signer};
use crate::service::dto::{MetricQuery, MetricRequest, MetricResponse};
use crate::service::MetricsService;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_ENCODING, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::io::Read;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Shared state of the collector handlers.
#[derive(Clone)]
pub struct HttpState {
    pub service: MetricsService,
    pub signer: Option<Signer>,
}

/// Create the collector router.
pub fn create_http_router(service: MetricsService, signer: Option<Signer>) -> Router {
    let state = HttpState { service, signer };

    Router::new()
        .route("/update/:type/:name/:value", post(update_by_params))
        .route("/update/", post(update_json))
        .route("/updates/", post(updates_json))
        .route("/value/", post(value_json))
        .route("/value/:type/:name", get(value_by_params))
        .route("/ping", get(ping))
        .route("/", get(list_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .with_state(state)
}

async fn update_by_params(
    State(state): State<HttpState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, HttpError> {
    state
        .service
        .create_or_update_by_params(&kind, &name, &value)
        .await?;

    Ok((StatusCode::OK, "OK"))
}

async fn update_json(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MetricResponse>, HttpError> {
    let request: MetricRequest = decode_json(&state, &headers, &body)?;
    let stored = state.service.create_or_update(request.into_metric()?).await?;

    Ok(Json(stored.into()))
}

async fn updates_json(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<MetricResponse>>, HttpError> {
    let requests: Vec<MetricRequest> = decode_json(&state, &headers, &body)?;
    if requests.is_empty() {
        return Err(HttpError::BadRequest("empty metric batch".to_string()));
    }

    let metrics = requests
        .into_iter()
        .map(MetricRequest::into_metric)
        .collect::<crate::core::Result<Vec<_>>>()?;
    let stored = state.service.create_or_update_many(metrics).await?;

    Ok(Json(stored.into_iter().map(MetricResponse::from).collect()))
}

async fn value_json(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MetricResponse>, HttpError> {
    let query: MetricQuery = decode_json(&state, &headers, &body)?;
    let metric = state.service.get_metric(&query.kind, &query.id).await?;

    Ok(Json(metric))
}

async fn value_by_params(
    State(state): State<HttpState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<String, HttpError> {
    let value = state.service.get_metric_value(&kind, &name).await?;
    Ok(value.to_string())
}

async fn list_metrics(State(state): State<HttpState>) -> Result<Html<String>, HttpError> {
    Ok(Html(state.service.get_all_as_html().await?))
}

async fn ping(State(state): State<HttpState>) -> Result<StatusCode, HttpError> {
    state.service.ping().await.map_err(|e| {
        tracing::error!("Storage ping failed: {}", e);
        HttpError::Internal(e.to_string())
    })?;
    Ok(StatusCode::OK)
}

/// Turns a panic in a handler into a 500 response instead of a dropped connection.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "no error details"
    };

    tracing::error!("panic in web handler: {detail}");
    HttpError::Internal(detail.to_string()).into_response()
}

/// Verifies the signature over the raw body, decompresses it and parses JSON.
fn decode_json<T: DeserializeOwned>(
    state: &HttpState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, HttpError> {
    if let (Some(signer), Some(signature)) = (&state.signer, headers.get(SIGNATURE_HEADER)) {
        let signature = signature
            .to_str()
            .map_err(|_| HttpError::BadRequest("malformed signature header".to_string()))?;
        if !signer.verify(signature, body) {
            return Err(HttpError::BadRequest("invalid signature".to_string()));
        }
    }

    let gzipped = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

    if gzipped {
        let mut decoded = Vec::new();
        GzDecoder::new(body)
            .read_to_end(&mut decoded)
            .map_err(|e| HttpError::BadRequest(format!("invalid gzip body: {}", e)))?;
        parse_json(&decoded)
    } else {
        parse_json(body)
    }
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, HttpError> {
    serde_json::from_slice(body).map_err(|e| HttpError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// HTTP-specific error type.
#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<MetricsError> for HttpError {
    fn from(err: MetricsError) -> Self {
        if err.is_client_error() {
            HttpError::BadRequest(err.to_string())
        } else if err.is_not_found() {
            HttpError::NotFound(err.to_string())
        } else {
            tracing::error!(category = err.category(), "Request failed: {}", err);
            HttpError::Internal(err.to_string())
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            HttpError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            HttpError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            HttpError::Internal(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router(signer: Option<Signer>) -> Router {
        create_http_router(MetricsService::new(Arc::new(MemoryStore::new())), signer)
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn post_request(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::post(uri).body(body.into()).unwrap()
    }

    #[tokio::test]
    async fn test_update_by_params_status_codes() {
        let router = router(None);

        let (status, body) = call(&router, post_request("/update/counter/Hits/5", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");

        let (status, _) = call(&router, post_request("/update/bogus/Hits/5", Body::empty())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&router, post_request("/update/counter/Hits/abc", Body::empty())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_value_by_params() {
        let router = router(None);
        call(&router, post_request("/update/counter/Hits/5", Body::empty())).await;
        call(&router, post_request("/update/counter/Hits/3", Body::empty())).await;

        let request = Request::get("/value/counter/Hits").body(Body::empty()).unwrap();
        let (status, body) = call(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "8");

        let request = Request::get("/value/gauge/Missing").body(Body::empty()).unwrap();
        let (status, _) = call(&router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_json_answers_stored_metric() {
        let router = router(None);

        let (status, body) =
            call(&router, post_request("/update/", r#"{"id":"Alloc","type":"gauge","value":2.5}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let response: MetricResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.id, "Alloc");
        assert_eq!(response.value, Some(2.5));

        let (status, _) = call(&router, post_request("/update/", r#"{"id":"Alloc","type":"gauge"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&router, post_request("/update/", "not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_signature_mismatch_is_rejected() {
        let signer = Signer::new("secret");
        let router = router(Some(signer.clone()));
        let body = r#"{"id":"PollCount","type":"counter","delta":1}"#;

        let request = Request::post("/update/")
            .header(SIGNATURE_HEADER, Signer::new("wrong").sign(body.as_bytes()))
            .body(Body::from(body))
            .unwrap();
        let (status, _) = call(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::post("/update/")
            .header(SIGNATURE_HEADER, signer.sign(body.as_bytes()))
            .body(Body::from(body))
            .unwrap();
        let (status, _) = call(&router, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_updates_and_listing() {
        let router = router(None);
        let batch = r#"[
            {"id":"PollCount","type":"counter","delta":2},
            {"id":"RandomValue","type":"gauge","value":0.5}
        ]"#;

        let (status, body) = call(&router, post_request("/updates/", batch)).await;
        assert_eq!(status, StatusCode::OK);
        let stored: Vec<MetricResponse> = serde_json::from_str(&body).unwrap();
        assert_eq!(stored.len(), 2);

        let (status, _) = call(&router, post_request("/updates/", "[]")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            call(&router, post_request("/value/", r#"{"id":"PollCount","type":"counter"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<MetricResponse>(&body).unwrap().delta, Some(2));

        let (status, html) =
            call(&router, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<strong>RandomValue: </strong>"));
    }

    #[tokio::test]
    async fn test_ping() {
        let router = router(None);
        let (status, _) = call(&router, Request::get("/ping").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_panicking_handler_answers_internal_error() {
        async fn explode() -> StatusCode {
            panic!("handler exploded")
        }

        let router = Router::new()
            .route("/explode", get(explode))
            .layer(CatchPanicLayer::custom(handle_panic));

        let (status, body) = call(&router, Request::get("/explode").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["error"], "handler exploded");
        assert_eq!(body["status"], 500);

        let response = handle_panic(Box::new(42_u8));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
