//! Request/response middleware surface.
//!
//! # Responsibilities
//! - Wrap any HTTP client `tower::Service` (e.g. the hyper-util legacy client)
//! - Attach the call's `CorrelationId` to the request extensions
//! - Buffer bodies of known, bounded size for logging and hand the inner
//!   service / caller byte-identical bodies
//!
//! # Design Decisions
//! - Bodies without a known upper size, or above `max_buffer_bytes`, stream
//!   through untouched and are logged as not captured
//! - A body read error is replayed to whoever reads the body next
//! - While detached (`restore`), the layer forwards without tracking

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes, HttpBody};
use axum::http::{header, Request, Response};
use axum::BoxError;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tower::{Layer, Service};

use crate::capture::{parse_request_body, parse_response_body, CallCapture, CallOutcome};
use crate::intercept::CaptureSink;

/// Outcome of trying to buffer a body for logging.
enum Buffered {
    Captured(Bytes),
    NotCaptured,
    ReadFailed(String),
}

impl Buffered {
    fn into_value(self, parse: impl FnOnce(&[u8]) -> Option<Value>) -> Option<Value> {
        match self {
            Buffered::Captured(bytes) => parse(&bytes),
            Buffered::NotCaptured => Some(Value::String("<streamed body not captured>".into())),
            Buffered::ReadFailed(error) => Some(Value::String(format!("<body read failed: {}>", error))),
        }
    }
}

/// Read a body into memory when its size is known to be within `limit`.
///
/// Returns a replacement body that yields the same bytes (or the same error).
async fn buffer_body<B>(body: B, limit: usize) -> (Body, Buffered)
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let within_limit = matches!(body.size_hint().upper(), Some(upper) if upper <= limit as u64);
    if !within_limit {
        return (Body::new(body), Buffered::NotCaptured);
    }

    match axum::body::to_bytes(Body::new(body), limit).await {
        Ok(bytes) => (Body::from(bytes.clone()), Buffered::Captured(bytes)),
        Err(e) => {
            let description = e.to_string();
            let replay = Body::from_stream(futures_util::stream::once(async move { Err::<Bytes, _>(e) }));
            (replay, Buffered::ReadFailed(description))
        }
    }
}

/// `tower::Layer` producing [`InspectorService`]s.
#[derive(Clone)]
pub struct InspectorLayer {
    sink: CaptureSink,
    attached: Arc<AtomicBool>,
}

impl InspectorLayer {
    pub(crate) fn new(sink: CaptureSink, attached: Arc<AtomicBool>) -> Self {
        Self { sink, attached }
    }
}

impl<S> Layer<S> for InspectorLayer {
    type Service = InspectorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InspectorService {
            inner,
            sink: self.sink.clone(),
            attached: self.attached.clone(),
        }
    }
}

/// Observes every request sent through the wrapped client service.
#[derive(Clone)]
pub struct InspectorService<S> {
    inner: S,
    sink: CaptureSink,
    attached: Arc<AtomicBool>,
}

impl<S, ResBody> Service<Request<Body>> for InspectorService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display + Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // The clone may not be ready; keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !self.attached.load(Ordering::Acquire) || !self.sink.is_active() {
            return Box::pin(async move { inner.call(req).await.map(|res| res.map(Body::new)) });
        }

        let policy = self.sink.policy();
        let method = req.method().to_string();
        let url = req.uri().to_string();
        let request_headers = policy.redactor.redact_map(req.headers());
        let pending = self.sink.begin(&method, &url);
        if let Some(id) = pending.id() {
            req.extensions_mut().insert(id.clone());
        }

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let (body, buffered) = buffer_body(body, policy.max_buffer_bytes).await;
            let req = Request::from_parts(parts, body);
            let call = CallCapture {
                method,
                url,
                request_headers: Some(request_headers),
                request_body: buffered.into_value(parse_request_body),
            };

            match inner.call(req).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let headers = policy.redactor.redact_map(response.headers());
                    let content_type = response
                        .headers()
                        .get(header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let (parts, body) = response.into_parts();
                    let (body, buffered) = buffer_body(body, policy.max_buffer_bytes).await;
                    let body_value = buffered.into_value(|b| parse_response_body(content_type.as_deref(), b));

                    pending.complete(
                        call,
                        CallOutcome::Response {
                            status,
                            headers,
                            body: body_value,
                        },
                    );
                    Ok(Response::from_parts(parts, body))
                }
                Err(e) => {
                    pending.complete(call, CallOutcome::Failed { error: e.to_string() });
                    Err(e)
                }
            }
        })
    }
}
