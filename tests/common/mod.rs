//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use app_inspector::config::StoreConfig;
use app_inspector::InspectorConfig;

/// Delay of the `/users` route.
pub const USERS_DELAY: Duration = Duration::from_millis(50);

/// Start the mock backend on an ephemeral port.
///
/// Routes:
/// - `GET /users`: JSON list, answered after [`USERS_DELAY`]
/// - `POST /echo`: echoes the body with the request's content type
/// - `GET /large`: a JSON document of several kilobytes
/// - `GET /text`: plain text
pub async fn start_mock_backend() -> SocketAddr {
    let app = Router::new()
        .route("/users", get(users))
        .route("/echo", post(echo))
        .route("/large", get(large))
        .route("/text", get(|| async { "plain response" }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing is listening on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Configuration with capture enabled regardless of build profile.
pub fn enabled_config() -> InspectorConfig {
    InspectorConfig {
        store: StoreConfig {
            enabled: true,
            ..StoreConfig::default()
        },
        ..InspectorConfig::default()
    }
}

async fn users() -> Json<Value> {
    tokio::time::sleep(USERS_DELAY).await;
    Json(json!([{"id": 1, "name": "ada"}, {"id": 2, "name": "grace"}]))
}

async fn echo(headers: HeaderMap, body: Bytes) -> (StatusCode, [(header::HeaderName, String); 1], Bytes) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body)
}

async fn large() -> Json<Value> {
    let items: Vec<Value> = (0..500).map(|i| json!({"index": i, "label": "padding"})).collect();
    Json(json!({"items": items}))
}
