//! Ambient request-function surface.
//!
//! # Responsibilities
//! - `FetchSlot`: the host's shared request function that application code calls
//! - `FetchInterceptor`: swap in an observing wrapper, restore the saved original
//! - `ReqwestFetch`: the default request function backed by `reqwest`
//!
//! # Design Decisions
//! - Install is idempotent and saves exactly one original
//! - Restore puts back the same `Arc` that was saved
//! - Responses are fully buffered `Bytes`, so the logging copy is a refcount bump

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use futures_util::future::BoxFuture;
use url::Url;

use crate::capture::{parse_request_body, parse_response_body, CallCapture, CallOutcome};
use crate::intercept::{CaptureSink, TransportError, TransportResponse};

/// An outbound request for the ambient request function.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Parse `url` and build a request.
    pub fn parse(method: Method, url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::InvalidRequest(format!("{}: {}", url, e)))?;
        Ok(Self::new(method, url))
    }

    pub fn get(url: &str) -> Result<Self, TransportError> {
        Self::parse(Method::GET, url)
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body and set a JSON content type.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Result<Self, TransportError> {
        let body = serde_json::to_vec(value).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        self.headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(body.into());
        Ok(self)
    }
}

/// A request function.
pub trait Fetch: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;
}

/// Default request function backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetch for ReqwestFetch {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        Box::pin(async move {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok(TransportResponse { status, headers, body })
        })
    }
}

/// The host's shared request function.
#[derive(Default)]
pub struct FetchSlot {
    current: RwLock<Option<Arc<dyn Fetch>>>,
}

impl FetchSlot {
    pub fn new(fetch: Arc<dyn Fetch>) -> Self {
        Self {
            current: RwLock::new(Some(fetch)),
        }
    }

    /// A slot with no request function installed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A slot holding a default `reqwest` request function.
    pub fn reqwest() -> Self {
        Self::new(Arc::new(ReqwestFetch::default()))
    }

    pub fn current(&self) -> Option<Arc<dyn Fetch>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap the request function, returning the previous one.
    pub fn replace(&self, fetch: Option<Arc<dyn Fetch>>) -> Option<Arc<dyn Fetch>> {
        std::mem::replace(
            &mut *self.current.write().unwrap_or_else(PoisonError::into_inner),
            fetch,
        )
    }

    /// Issue a request through whatever function is currently installed.
    pub async fn fetch(&self, request: FetchRequest) -> Result<TransportResponse, TransportError> {
        let fetch = self.current().ok_or(TransportError::Unavailable)?;
        fetch.fetch(request).await
    }
}

impl std::fmt::Debug for FetchSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchSlot")
            .field("installed", &self.current().is_some())
            .finish()
    }
}

/// The observing wrapper installed into a [`FetchSlot`].
struct InstrumentedFetch {
    original: Arc<dyn Fetch>,
    sink: CaptureSink,
}

impl Fetch for InstrumentedFetch {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        if !self.sink.is_active() {
            return self.original.fetch(request);
        }

        let policy = self.sink.policy();
        let call = CallCapture {
            method: request.method.to_string(),
            url: request.url.to_string(),
            request_headers: Some(policy.redactor.redact_map(&request.headers)),
            request_body: request.body.as_deref().and_then(parse_request_body),
        };
        let pending = self.sink.begin(&call.method, &call.url);
        let response = self.original.fetch(request);

        Box::pin(async move {
            match response.await {
                Ok(response) => {
                    let observed = response.clone();
                    let outcome = CallOutcome::Response {
                        status: observed.status.as_u16(),
                        headers: policy.redactor.redact_map(&observed.headers),
                        body: parse_response_body(observed.content_type(), &observed.body),
                    };
                    pending.complete(call, outcome);
                    Ok(response)
                }
                Err(e) => {
                    pending.complete(call, CallOutcome::Failed { error: e.to_string() });
                    Err(e)
                }
            }
        })
    }
}

struct Installed {
    slot: Arc<FetchSlot>,
    original: Arc<dyn Fetch>,
}

/// Install/restore pair for a [`FetchSlot`].
pub struct FetchInterceptor {
    sink: CaptureSink,
    installed: Mutex<Option<Installed>>,
}

impl FetchInterceptor {
    pub fn new(sink: CaptureSink) -> Self {
        Self {
            sink,
            installed: Mutex::new(None),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Wrap the slot's request function. No-op if already installed or the slot is empty.
    pub fn install(&self, slot: &Arc<FetchSlot>) -> bool {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if installed.is_some() {
            tracing::debug!("Fetch interceptor already installed");
            return false;
        }
        let Some(original) = slot.current() else {
            tracing::debug!("No request function in slot, fetch interception skipped");
            return false;
        };

        let wrapper: Arc<dyn Fetch> = Arc::new(InstrumentedFetch {
            original: original.clone(),
            sink: self.sink.clone(),
        });
        slot.replace(Some(wrapper));
        *installed = Some(Installed {
            slot: slot.clone(),
            original,
        });
        tracing::info!(surface = "fetch", "Interceptor installed");
        true
    }

    /// Put the saved original back. No-op if not installed.
    pub fn restore(&self) -> bool {
        let Some(Installed { slot, original }) = self
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return false;
        };
        slot.replace(Some(original));
        tracing::info!(surface = "fetch", "Interceptor restored");
        true
    }
}
