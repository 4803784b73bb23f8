//! Transport interception subsystem.
//!
//! # Data Flow
//! ```text
//! application call
//!     → surface wrapper (middleware.rs | fetch.rs | request_object.rs)
//!         → CaptureSink::begin (correlation start, request snapshot)
//!         → original transport (same arguments, result returned unchanged)
//!         → PendingCall::complete (duration, response snapshot)
//!     → EventStore::network
//! ```
//!
//! # Design Decisions
//! - Interceptors observe, never alter: every result and error reaches the caller as-is
//! - A missing facility means the surface is skipped, not an error
//! - Each surface installs and restores independently; each keeps exactly one
//!   saved original and restores that same reference
//! - A call abandoned mid-flight (future dropped, callback never run) releases
//!   its correlation entry without recording

pub mod fetch;
pub mod middleware;
pub mod request_object;

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use thiserror::Error;

use crate::capture::{CallCapture, CallOutcome, CapturePolicy};
use crate::correlation::{CorrelationId, CorrelationTracker};
use crate::store::EventStore;

pub use fetch::{Fetch, FetchInterceptor, FetchRequest, FetchSlot, ReqwestFetch};
pub use middleware::{InspectorLayer, InspectorService};
pub use request_object::{
    CompletionCallback, RequestObject, RequestObjectFactory, RequestObjectInterceptor,
    RequestObjectSlot, ReqwestRequestObjectFactory,
};

/// An instrumentable transport surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    /// Request/response middleware (`tower` layer).
    Middleware,
    /// The shared ambient request function.
    Fetch,
    /// The shared open/send request-object transport.
    RequestObject,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Middleware, Surface::Fetch, Surface::RequestObject];

    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Middleware => "middleware",
            Surface::Fetch => "fetch",
            Surface::RequestObject => "request_object",
        }
    }
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the transports the application calls through.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport facility is not available")]
    Unavailable,

    #[error("{0}")]
    Failed(String),
}

/// A fully buffered response.
///
/// Cloning is cheap: the body is reference counted.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Where every surface sends what it observed.
#[derive(Clone)]
pub struct CaptureSink {
    store: Arc<EventStore>,
    tracker: Arc<CorrelationTracker>,
    policy: Arc<ArcSwap<CapturePolicy>>,
}

impl CaptureSink {
    pub fn new(
        store: Arc<EventStore>,
        tracker: Arc<CorrelationTracker>,
        policy: Arc<ArcSwap<CapturePolicy>>,
    ) -> Self {
        Self {
            store,
            tracker,
            policy,
        }
    }

    /// Whether observations would be stored at all.
    pub fn is_active(&self) -> bool {
        self.store.is_enabled()
    }

    /// The policy in effect right now.
    pub fn policy(&self) -> Arc<CapturePolicy> {
        self.policy.load_full()
    }

    pub fn tracker(&self) -> &CorrelationTracker {
        &self.tracker
    }

    /// Start tracking a call.
    pub fn begin(&self, method: &str, url: &str) -> PendingCall {
        PendingCall {
            id: Some(self.tracker.begin(method, url)),
            sink: self.clone(),
        }
    }
}

impl std::fmt::Debug for CaptureSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSink")
            .field("active", &self.is_active())
            .field("in_flight", &self.tracker.in_flight())
            .finish()
    }
}

/// A call that has started and not yet been recorded.
///
/// Dropping it without [`PendingCall::complete`] releases the correlation
/// entry and records nothing.
#[derive(Debug)]
pub struct PendingCall {
    id: Option<CorrelationId>,
    sink: CaptureSink,
}

impl PendingCall {
    pub fn id(&self) -> Option<&CorrelationId> {
        self.id.as_ref()
    }

    /// Record the finished call. Returns false if its start was already consumed.
    pub fn complete(mut self, call: CallCapture, outcome: CallOutcome) -> bool {
        let Some(id) = self.id.take() else {
            return false;
        };
        let Some(elapsed) = self.sink.tracker.finish(&id) else {
            tracing::debug!(correlation_id = %id, "Completion without a matching start, not recorded");
            return false;
        };
        let fields = self.sink.policy().finish(call, outcome, Some(elapsed));
        tracing::debug!(
            correlation_id = %id,
            method = %fields.method,
            url = %fields.url,
            status = ?fields.status_code,
            duration_ms = ?fields.duration,
            "Network call captured"
        );
        self.sink.store.network(fields);
        true
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.sink.tracker.finish(&id);
            tracing::debug!(correlation_id = %id, "Call abandoned before completion");
        }
    }
}
