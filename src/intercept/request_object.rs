//! Imperative request-object surface.
//!
//! # Responsibilities
//! - `RequestObject`: open → set_request_header* → send(body, on_complete)
//! - `RequestObjectSlot`: the shared factory new request objects come from
//! - `RequestObjectInterceptor`: swap in a factory whose objects observe each step
//!
//! # Design Decisions
//! - Every wrapped step forwards the original arguments and returns the
//!   original result; the stash is only read for logging
//! - The call starts at `send`; the completion callback is wrapped so the
//!   event is recorded before the caller's callback runs
//! - A failed call is recorded with a generic description, including a
//!   send the transport rejects before starting

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use tokio::runtime::Handle;
use url::Url;

use crate::capture::{parse_request_body, parse_response_body, CallCapture, CallOutcome, GENERIC_FAILURE};
use crate::intercept::{CaptureSink, TransportError, TransportResponse};

/// Invoked exactly once when a sent request finishes.
pub type CompletionCallback = Box<dyn FnOnce(Result<TransportResponse, TransportError>) + Send + 'static>;

/// A single-use imperative request.
pub trait RequestObject: Send {
    fn open(&mut self, method: &str, url: &str) -> Result<(), TransportError>;

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError>;

    /// Start the request. `on_complete` runs when it finishes, unless this returns an error.
    fn send(&mut self, body: Option<Bytes>, on_complete: CompletionCallback) -> Result<(), TransportError>;
}

/// Creates request objects.
pub trait RequestObjectFactory: Send + Sync {
    fn create(&self) -> Box<dyn RequestObject>;
}

/// The host's shared request-object factory.
#[derive(Default)]
pub struct RequestObjectSlot {
    current: RwLock<Option<Arc<dyn RequestObjectFactory>>>,
}

impl RequestObjectSlot {
    pub fn new(factory: Arc<dyn RequestObjectFactory>) -> Self {
        Self {
            current: RwLock::new(Some(factory)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A slot holding the default `reqwest`-backed factory.
    pub fn reqwest() -> Self {
        Self::new(Arc::new(ReqwestRequestObjectFactory::default()))
    }

    pub fn current(&self) -> Option<Arc<dyn RequestObjectFactory>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, factory: Option<Arc<dyn RequestObjectFactory>>) -> Option<Arc<dyn RequestObjectFactory>> {
        std::mem::replace(
            &mut *self.current.write().unwrap_or_else(PoisonError::into_inner),
            factory,
        )
    }

    /// Create a request object from the current factory.
    pub fn create(&self) -> Result<Box<dyn RequestObject>, TransportError> {
        self.current()
            .map(|factory| factory.create())
            .ok_or(TransportError::Unavailable)
    }
}

impl std::fmt::Debug for RequestObjectSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestObjectSlot")
            .field("installed", &self.current().is_some())
            .finish()
    }
}

/// `reqwest`-backed request object; completes on the current tokio runtime.
pub struct ReqwestRequestObject {
    client: reqwest::Client,
    target: Option<(Method, Url)>,
    headers: HeaderMap,
}

impl RequestObject for ReqwestRequestObject {
    fn open(&mut self, method: &str, url: &str) -> Result<(), TransportError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let url = Url::parse(url).map_err(|e| TransportError::InvalidRequest(format!("{}: {}", url, e)))?;
        self.target = Some((method, url));
        self.headers.clear();
        Ok(())
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        if self.target.is_none() {
            return Err(TransportError::InvalidRequest("set_request_header before open".into()));
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        self.headers.append(name, value);
        Ok(())
    }

    fn send(&mut self, body: Option<Bytes>, on_complete: CompletionCallback) -> Result<(), TransportError> {
        let (method, url) = self
            .target
            .take()
            .ok_or_else(|| TransportError::InvalidRequest("send before open".into()))?;
        let runtime = Handle::try_current()
            .map_err(|e| TransportError::Failed(format!("no async runtime: {}", e)))?;

        let mut builder = self
            .client
            .request(method, url)
            .headers(std::mem::take(&mut self.headers));
        if let Some(body) = body {
            builder = builder.body(body);
        }

        runtime.spawn(async move {
            let result = async {
                let response = builder.send().await?;
                let status = response.status();
                let headers = response.headers().clone();
                let body = response.bytes().await?;
                Ok(TransportResponse { status, headers, body })
            }
            .await;
            on_complete(result);
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestRequestObjectFactory {
    client: reqwest::Client,
}

impl ReqwestRequestObjectFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl RequestObjectFactory for ReqwestRequestObjectFactory {
    fn create(&self) -> Box<dyn RequestObject> {
        Box::new(ReqwestRequestObject {
            client: self.client.clone(),
            target: None,
            headers: HeaderMap::new(),
        })
    }
}

/// Request object that records what passes through each step.
struct ObservedRequestObject {
    inner: Box<dyn RequestObject>,
    sink: CaptureSink,
    method: String,
    url: String,
    headers: Vec<(String, String)>,
}

impl RequestObject for ObservedRequestObject {
    fn open(&mut self, method: &str, url: &str) -> Result<(), TransportError> {
        self.method = method.to_string();
        self.url = url.to_string();
        self.headers.clear();
        self.inner.open(method, url)
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
        self.headers.push((name.to_string(), value.to_string()));
        self.inner.set_request_header(name, value)
    }

    fn send(&mut self, body: Option<Bytes>, on_complete: CompletionCallback) -> Result<(), TransportError> {
        // Nothing to attribute a send to before `open`.
        if !self.sink.is_active() || self.url.is_empty() {
            return self.inner.send(body, on_complete);
        }

        let policy = self.sink.policy();
        let call = CallCapture {
            method: self.method.clone(),
            url: self.url.clone(),
            request_headers: Some(
                policy
                    .redactor
                    .redact_pairs(self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))),
            ),
            request_body: body.as_deref().and_then(parse_request_body),
        };
        // Shared so a send rejected before it starts still completes the call.
        let in_flight = Arc::new(Mutex::new(Some((self.sink.begin(&call.method, &call.url), call))));

        let completion = in_flight.clone();
        let observed: CompletionCallback = Box::new(move |result: Result<TransportResponse, TransportError>| {
            let taken = completion.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some((pending, call)) = taken {
                let outcome = match &result {
                    Ok(response) => CallOutcome::Response {
                        status: response.status.as_u16(),
                        headers: policy.redactor.redact_map(&response.headers),
                        body: parse_response_body(response.content_type(), &response.body),
                    },
                    Err(_) => CallOutcome::Failed {
                        error: GENERIC_FAILURE.to_string(),
                    },
                };
                pending.complete(call, outcome);
            }
            on_complete(result);
        });

        let sent = self.inner.send(body, observed);
        if sent.is_err() {
            let taken = in_flight.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some((pending, call)) = taken {
                pending.complete(
                    call,
                    CallOutcome::Failed {
                        error: GENERIC_FAILURE.to_string(),
                    },
                );
            }
        }
        sent
    }
}

struct ObservingFactory {
    original: Arc<dyn RequestObjectFactory>,
    sink: CaptureSink,
}

impl RequestObjectFactory for ObservingFactory {
    fn create(&self) -> Box<dyn RequestObject> {
        Box::new(ObservedRequestObject {
            inner: self.original.create(),
            sink: self.sink.clone(),
            method: String::new(),
            url: String::new(),
            headers: Vec::new(),
        })
    }
}

struct Installed {
    slot: Arc<RequestObjectSlot>,
    original: Arc<dyn RequestObjectFactory>,
}

/// Install/restore pair for a [`RequestObjectSlot`].
pub struct RequestObjectInterceptor {
    sink: CaptureSink,
    installed: Mutex<Option<Installed>>,
}

impl RequestObjectInterceptor {
    pub fn new(sink: CaptureSink) -> Self {
        Self {
            sink,
            installed: Mutex::new(None),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Wrap the slot's factory. No-op if already installed or the slot is empty.
    pub fn install(&self, slot: &Arc<RequestObjectSlot>) -> bool {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if installed.is_some() {
            return false;
        }
        let Some(original) = slot.current() else {
            tracing::debug!("No request-object factory in slot, interception skipped");
            return false;
        };

        slot.replace(Some(Arc::new(ObservingFactory {
            original: original.clone(),
            sink: self.sink.clone(),
        })));
        *installed = Some(Installed {
            slot: slot.clone(),
            original,
        });
        tracing::info!(surface = "request_object", "Interceptor installed");
        true
    }

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
        tracing::info!(surface = "request_object", "Interceptor restored");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CapturePolicy, REDACTION_MARKER};
    use crate::correlation::CorrelationTracker;
    use crate::store::EventStore;
    use arc_swap::ArcSwap;
    use axum::http::StatusCode;
    use serde_json::json;

    /// Completes synchronously inside `send` and remembers what it was given.
    #[derive(Default)]
    struct Recorded {
        calls: Mutex<Vec<String>>,
    }

    struct ScriptedObject {
        log: Arc<Recorded>,
        fail: bool,
    }

    impl RequestObject for ScriptedObject {
        fn open(&mut self, method: &str, url: &str) -> Result<(), TransportError> {
            self.log.calls.lock().unwrap().push(format!("open {} {}", method, url));
            Ok(())
        }

        fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), TransportError> {
            self.log.calls.lock().unwrap().push(format!("header {}={}", name, value));
            Ok(())
        }

        fn send(&mut self, body: Option<Bytes>, on_complete: CompletionCallback) -> Result<(), TransportError> {
            let len = body.as_ref().map(|b| b.len()).unwrap_or(0);
            self.log.calls.lock().unwrap().push(format!("send {}", len));
            if self.fail {
                on_complete(Err(TransportError::Failed("socket closed".into())));
            } else {
                let mut headers = HeaderMap::new();
                headers.insert("content-type", HeaderValue::from_static("text/plain"));
                on_complete(Ok(TransportResponse {
                    status: StatusCode::ACCEPTED,
                    headers,
                    body: Bytes::from_static(b"queued"),
                }));
            }
            Ok(())
        }
    }

    struct ScriptedFactory {
        log: Arc<Recorded>,
        fail: bool,
    }

    impl RequestObjectFactory for ScriptedFactory {
        fn create(&self) -> Box<dyn RequestObject> {
            Box::new(ScriptedObject {
                log: self.log.clone(),
                fail: self.fail,
            })
        }
    }

    fn setup(fail: bool) -> (Arc<EventStore>, Arc<RequestObjectSlot>, RequestObjectInterceptor, Arc<Recorded>) {
        let store = Arc::new(EventStore::with_capacity(10));
        let log = Arc::new(Recorded::default());
        let slot = Arc::new(RequestObjectSlot::new(Arc::new(ScriptedFactory {
            log: log.clone(),
            fail,
        })));
        let interceptor = RequestObjectInterceptor::new(CaptureSink::new(
            store.clone(),
            Arc::new(CorrelationTracker::new()),
            Arc::new(ArcSwap::from_pointee(CapturePolicy::default())),
        ));
        (store, slot, interceptor, log)
    }

    #[test]
    fn test_steps_forwarded_and_recorded() {
        let (store, slot, interceptor, log) = setup(false);
        assert!(interceptor.install(&slot));

        let seen = Arc::new(Mutex::new(None));
        let seen_cb = seen.clone();
        let mut request = slot.create().unwrap();
        request.open("post", "https://x/jobs").unwrap();
        request.set_request_header("Authorization", "secret").unwrap();
        request.set_request_header("X-Trace", "abc").unwrap();
        request
            .send(
                Some(Bytes::from_static(br#"{"job":1}"#)),
                Box::new(move |result: Result<TransportResponse, TransportError>| {
                    *seen_cb.lock().unwrap() = result.ok().map(|r| r.text());
                }),
            )
            .unwrap();

        assert_eq!(
            *log.calls.lock().unwrap(),
            vec![
                "open post https://x/jobs",
                "header Authorization=secret",
                "header X-Trace=abc",
                "send 9"
            ]
        );
        assert_eq!(seen.lock().unwrap().as_deref(), Some("queued"));

        let event = store.latest().unwrap();
        let fields = event.network().unwrap();
        assert_eq!(event.message, "POST 202 https://x/jobs");
        assert_eq!(fields.request_headers.as_ref().unwrap()["authorization"], REDACTION_MARKER);
        assert_eq!(fields.request_headers.as_ref().unwrap()["x-trace"], "abc");
        assert_eq!(fields.request_body, Some(json!({"job": 1})));
        assert_eq!(fields.response_body, Some(json!("queued")));
    }

    #[test]
    fn test_failure_uses_generic_description() {
        let (store, slot, interceptor, _) = setup(true);
        interceptor.install(&slot);

        let mut request = slot.create().unwrap();
        request.open("GET", "https://x/feed").unwrap();
        request.send(None, Box::new(|result: Result<TransportResponse, TransportError>| assert!(result.is_err()))).unwrap();

        let event = store.latest().unwrap();
        assert_eq!(event.message, "GET ERROR https://x/feed");
        assert_eq!(event.network().unwrap().error.as_deref(), Some(GENERIC_FAILURE));
    }

    #[test]
    fn test_rejected_send_is_recorded_as_failure() {
        let store = Arc::new(EventStore::with_capacity(10));
        let tracker = Arc::new(CorrelationTracker::new());
        let interceptor = RequestObjectInterceptor::new(CaptureSink::new(
            store.clone(),
            tracker.clone(),
            Arc::new(ArcSwap::from_pointee(CapturePolicy::default())),
        ));
        let slot = Arc::new(RequestObjectSlot::reqwest());
        assert!(interceptor.install(&slot));

        // No runtime on this thread, so the transport refuses to start.
        let mut request = slot.create().unwrap();
        request.open("GET", "http://127.0.0.1:9/never").unwrap();
        let called = Arc::new(Mutex::new(false));
        let called_cb = called.clone();
        let err = request
            .send(
                None,
                Box::new(move |_: Result<TransportResponse, TransportError>| {
                    *called_cb.lock().unwrap() = true;
                }),
            )
            .unwrap_err();
        assert!(matches!(err, TransportError::Failed(_)));
        assert!(!*called.lock().unwrap());

        let event = store.latest().unwrap();
        assert_eq!(event.message, "GET ERROR http://127.0.0.1:9/never");
        assert_eq!(event.network().unwrap().error.as_deref(), Some(GENERIC_FAILURE));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_restore_returns_original_factory() {
        let (store, slot, interceptor, _) = setup(false);
        let original = slot.current().unwrap();
        assert!(interceptor.install(&slot));
        assert!(!interceptor.install(&slot));
        assert!(interceptor.restore());
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &original));

        let mut request = slot.create().unwrap();
        request.open("GET", "https://x").unwrap();
        request.send(None, Box::new(|_| {})).unwrap();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_empty_slot() {
        let (_, _, interceptor, _) = setup(false);
        let empty = Arc::new(RequestObjectSlot::empty());
        assert!(!interceptor.install(&empty));
        assert!(matches!(empty.create(), Err(TransportError::Unavailable)));
    }
}
