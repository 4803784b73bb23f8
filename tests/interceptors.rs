//! End-to-end tests of the transport surfaces against a live backend.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::json;
use tokio::sync::oneshot;
use tower::{ServiceBuilder, ServiceExt};

use app_inspector::capture::{GENERIC_FAILURE, REDACTION_MARKER, TRUNCATION_MARKER};
use app_inspector::intercept::{FetchRequest, FetchSlot, RequestObjectSlot, TransportError, TransportResponse};
use app_inspector::store::EventKind;
use app_inspector::{EventFilter, Inspector, InspectorOptions, Surface, TransportTargets};

mod common;

fn targets() -> (TransportTargets, Arc<FetchSlot>, Arc<RequestObjectSlot>) {
    let fetch = Arc::new(FetchSlot::reqwest());
    let request_object = Arc::new(RequestObjectSlot::reqwest());
    (
        TransportTargets {
            fetch: Some(fetch.clone()),
            request_object: Some(request_object.clone()),
        },
        fetch,
        request_object,
    )
}

#[tokio::test]
async fn test_middleware_records_timed_call() {
    let addr = common::start_mock_backend().await;
    let inspector = Inspector::new(&common::enabled_config());
    assert!(inspector.install_transport(Surface::Middleware, &TransportTargets::default()));

    let client = Client::builder(TokioExecutor::new()).build_http::<Body>();
    let service = ServiceBuilder::new()
        .layer(inspector.middleware_layer())
        .service(client);

    let url = format!("http://{}/users", addr);
    let res = service
        .oneshot(Request::get(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), 1 << 20).await.unwrap();
    assert_eq!(serde_json::from_slice::<serde_json::Value>(&body).unwrap()[0]["name"], "ada");

    let events = inspector.list(EventFilter::NetworkOnly);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.kind(), EventKind::Network);
    assert_eq!(event.message, format!("GET 200 {}", url));

    let fields = event.network().unwrap();
    assert_eq!(fields.method, "GET");
    assert_eq!(fields.status_code, Some(200));
    let duration = fields.duration.unwrap();
    assert!(
        (common::USERS_DELAY.as_millis() as u64..1_000).contains(&duration),
        "duration {} out of range",
        duration
    );
    assert_eq!(fields.response_body.as_ref().unwrap()[1]["name"], "grace");
    assert_eq!(inspector.tracker().in_flight(), 0);
}

#[tokio::test]
async fn test_fetch_redacts_and_parses_bodies() {
    let addr = common::start_mock_backend().await;
    let inspector = Inspector::new(&common::enabled_config());
    let (targets, fetch, _) = targets();
    inspector.install_transport(Surface::Fetch, &targets);

    let request = FetchRequest::parse(Method::POST, &format!("http://{}/echo", addr))
        .unwrap()
        .header("Authorization", "secret")
        .unwrap()
        .header("x-request-source", "tests")
        .unwrap()
        .json(&json!({"name": "widget"}))
        .unwrap();
    let res = fetch.fetch(request).await.unwrap();

    // The caller's response is untouched by logging.
    assert_eq!(res.json::<serde_json::Value>().unwrap(), json!({"name": "widget"}));

    let event = inspector.list(EventFilter::NetworkOnly).pop().unwrap();
    let fields = event.network().unwrap();
    let request_headers = fields.request_headers.as_ref().unwrap();
    assert_eq!(request_headers["authorization"], REDACTION_MARKER);
    assert_eq!(request_headers["x-request-source"], "tests");
    assert_eq!(fields.request_body, Some(json!({"name": "widget"})));
    assert_eq!(fields.response_body, Some(json!({"name": "widget"})));
}

#[tokio::test]
async fn test_fetch_truncates_large_response() {
    let addr = common::start_mock_backend().await;
    let inspector = Inspector::new(&common::enabled_config());
    inspector.configure(InspectorOptions {
        max_body_length: Some(100),
        ..InspectorOptions::default()
    });
    let (targets, fetch, _) = targets();
    inspector.install_transport(Surface::Fetch, &targets);

    let res = fetch
        .fetch(FetchRequest::get(&format!("http://{}/large", addr)).unwrap())
        .await
        .unwrap();
    assert!(res.body.len() > 100);

    let event = inspector.list(EventFilter::NetworkOnly).pop().unwrap();
    let stored = event.network().unwrap().response_body.clone().unwrap();
    let stored = stored.as_str().unwrap();
    assert!(stored.starts_with(r#"{"items":["#));
    assert!(stored.ends_with(TRUNCATION_MARKER));
    assert_eq!(stored.chars().count(), 100 + TRUNCATION_MARKER.chars().count());
}

#[tokio::test]
async fn test_fetch_failure_is_recorded_and_returned() {
    let addr = common::closed_addr().await;
    let inspector = Inspector::new(&common::enabled_config());
    let (targets, fetch, _) = targets();
    inspector.install_transport(Surface::Fetch, &targets);

    let url = format!("http://{}/down", addr);
    let err = fetch.fetch(FetchRequest::get(&url).unwrap()).await.unwrap_err();
    assert!(matches!(err, TransportError::Http(_)));

    let event = inspector.list(EventFilter::NetworkOnly).pop().unwrap();
    assert_eq!(event.message, format!("GET ERROR {}", url));
    let fields = event.network().unwrap();
    assert_eq!(fields.status_code, None);
    assert!(!fields.error.as_deref().unwrap().is_empty());
}

#[tokio::test]
async fn test_request_object_round_trip() {
    let addr = common::start_mock_backend().await;
    let inspector = Inspector::new(&common::enabled_config());
    let (targets, _, request_slot) = targets();
    inspector.install_transport(Surface::RequestObject, &targets);

    let url = format!("http://{}/text", addr);
    let mut request = request_slot.create().unwrap();
    request.open("get", &url).unwrap();
    request.set_request_header("X-API-Key", "k-123").unwrap();
    let (tx, rx) = oneshot::channel();
    request
        .send(
            None,
            Box::new(move |result: Result<TransportResponse, TransportError>| {
                let _ = tx.send(result);
            }),
        )
        .unwrap();
    let res = rx.await.unwrap().unwrap();
    assert_eq!(res.text(), "plain response");

    let event = inspector.list(EventFilter::NetworkOnly).pop().unwrap();
    assert_eq!(event.message, format!("GET 200 {}", url));
    let fields = event.network().unwrap();
    assert_eq!(fields.request_headers.as_ref().unwrap()["x-api-key"], REDACTION_MARKER);
    assert_eq!(fields.response_body, Some(json!("plain response")));
}

#[tokio::test]
async fn test_request_object_failure_uses_generic_description() {
    let addr = common::closed_addr().await;
    let inspector = Inspector::new(&common::enabled_config());
    let (targets, _, request_slot) = targets();
    inspector.install_transport(Surface::RequestObject, &targets);

    let mut request = request_slot.create().unwrap();
    request.open("GET", &format!("http://{}/", addr)).unwrap();
    let (tx, rx) = oneshot::channel();
    request
        .send(
            None,
            Box::new(move |result: Result<TransportResponse, TransportError>| {
                let _ = tx.send(result.is_err());
            }),
        )
        .unwrap();
    assert!(rx.await.unwrap());

    let event = inspector.list(EventFilter::NetworkOnly).pop().unwrap();
    assert_eq!(event.network().unwrap().error.as_deref(), Some(GENERIC_FAILURE));
}

#[tokio::test]
async fn test_restore_stops_capture_on_every_surface() {
    let addr = common::start_mock_backend().await;
    let inspector = Inspector::new(&common::enabled_config());
    let (targets, fetch, request_slot) = targets();
    let original_fetch = fetch.current().unwrap();

    assert_eq!(inspector.install_all_transports(&targets).len(), 3);
    assert_eq!(inspector.restore_all_transports().len(), 3);
    assert!(Arc::ptr_eq(&fetch.current().unwrap(), &original_fetch));

    fetch
        .fetch(FetchRequest::get(&format!("http://{}/text", addr)).unwrap())
        .await
        .unwrap();

    let mut request = request_slot.create().unwrap();
    request.open("GET", &format!("http://{}/text", addr)).unwrap();
    let (tx, rx) = oneshot::channel();
    request
        .send(
            None,
            Box::new(move |result: Result<TransportResponse, TransportError>| {
                let _ = tx.send(result.is_ok());
            }),
        )
        .unwrap();
    assert!(rx.await.unwrap());

    let client = Client::builder(TokioExecutor::new()).build_http::<Body>();
    let service = ServiceBuilder::new()
        .layer(inspector.middleware_layer())
        .service(client);
    service
        .oneshot(
            Request::get(format!("http://{}/text", addr))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(inspector.count(), 0);
}
