//! The inspector facade: one owned store plus everything that feeds it.
//!
//! # Responsibilities
//! - Producer API (`info`, `warn`, `error`, `network`, `clear`, `configure`)
//! - Consumer API (`list`, `count`, `subscribe`)
//! - Installation API for the failure hook and each transport surface

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;

use crate::capture::{BodyTruncator, CapturePolicy, HeaderRedactor};
use crate::config::InspectorConfig;
use crate::correlation::{CorrelationTracker, NetworkTimer};
use crate::failure::{FailureFacility, FailureHook};
use crate::intercept::{
    CaptureSink, FetchInterceptor, FetchSlot, InspectorLayer, RequestObjectInterceptor, RequestObjectSlot, Surface,
};
use crate::store::{Event, EventFilter, EventStore, HeaderSnapshot, NetworkFields, StoreOptions, Subscription};

/// Live options. `None` leaves the current value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectorOptions {
    pub max_capacity: Option<usize>,
    /// Extra names to redact, merged with the built-in set.
    pub sensitive_headers: Option<Vec<String>>,
    pub max_body_length: Option<usize>,
}

/// The shared facilities transport surfaces are installed into.
#[derive(Debug, Clone, Default)]
pub struct TransportTargets {
    pub fetch: Option<Arc<FetchSlot>>,
    pub request_object: Option<Arc<RequestObjectSlot>>,
}

pub struct Inspector {
    store: Arc<EventStore>,
    tracker: Arc<CorrelationTracker>,
    policy: Arc<ArcSwap<CapturePolicy>>,
    /// Extra sensitive headers currently in effect, kept to rebuild the redactor.
    sensitive_headers: std::sync::Mutex<Vec<String>>,
    middleware_attached: Arc<AtomicBool>,
    fetch: FetchInterceptor,
    request_object: RequestObjectInterceptor,
    failure_hook: FailureHook,
}

impl Inspector {
    /// Build an inspector whose failure hook sits on the process panic hook.
    pub fn new(config: &InspectorConfig) -> Self {
        let store = Arc::new(EventStore::new(&config.store));
        let failure_hook = FailureHook::new(store.clone(), &config.failure_hook);
        Self::assemble(config, store, failure_hook)
    }

    /// Build an inspector whose failure hook sits on `facility`.
    pub fn with_failure_facility(config: &InspectorConfig, facility: Arc<dyn FailureFacility>) -> Self {
        let store = Arc::new(EventStore::new(&config.store));
        let failure_hook = FailureHook::with_facility(store.clone(), facility, &config.failure_hook);
        Self::assemble(config, store, failure_hook)
    }

    fn assemble(config: &InspectorConfig, store: Arc<EventStore>, failure_hook: FailureHook) -> Self {
        let tracker = Arc::new(CorrelationTracker::new());
        let policy = Arc::new(ArcSwap::from_pointee(CapturePolicy::from_config(&config.capture)));
        let sink = CaptureSink::new(store.clone(), tracker.clone(), policy.clone());

        tracing::debug!(
            enabled = store.is_enabled(),
            max_capacity = store.capacity(),
            "Inspector created"
        );

        Self {
            store,
            tracker,
            policy,
            sensitive_headers: std::sync::Mutex::new(config.capture.sensitive_headers.clone()),
            middleware_attached: Arc::new(AtomicBool::new(false)),
            fetch: FetchInterceptor::new(sink.clone()),
            request_object: RequestObjectInterceptor::new(sink),
            failure_hook,
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<CorrelationTracker> {
        &self.tracker
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    // Producer API

    pub fn info(&self, message: impl Into<String>, data: Option<Value>) -> Option<Arc<Event>> {
        self.store.info(message, data)
    }

    pub fn warn(&self, message: impl Into<String>, data: Option<Value>) -> Option<Arc<Event>> {
        self.store.warn(message, data)
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        cause: Option<Value>,
        stack_trace: Option<String>,
    ) -> Option<Arc<Event>> {
        self.store.error(message, cause, stack_trace)
    }

    pub fn network(&self, fields: NetworkFields) -> Option<Arc<Event>> {
        self.store.network(fields)
    }

    /// Record a call made through a transport that cannot be wrapped.
    ///
    /// Headers are redacted and bodies truncated with the current policy,
    /// the same as for intercepted calls.
    pub fn log_network_event(&self, mut fields: NetworkFields) -> Option<Arc<Event>> {
        let policy = self.policy.load();
        let redact = |headers: HeaderSnapshot| {
            policy
                .redactor
                .redact_pairs(headers.iter().map(|(name, value)| (name.as_str(), value.as_str())))
        };
        fields.request_headers = fields.request_headers.map(redact);
        fields.response_headers = fields.response_headers.map(redact);
        fields.request_body = fields.request_body.map(|b| policy.truncator.truncate(b));
        fields.response_body = fields.response_body.map(|b| policy.truncator.truncate(b));
        self.store.network(fields)
    }

    /// A stopwatch for use with [`Inspector::log_network_event`].
    pub fn timer(&self) -> NetworkTimer {
        NetworkTimer::started()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Apply live options. Captures that start afterwards use the new policy.
    pub fn configure(&self, options: InspectorOptions) {
        if options.max_capacity.is_some() {
            self.store.configure(StoreOptions {
                max_capacity: options.max_capacity,
            });
        }

        if options.sensitive_headers.is_none() && options.max_body_length.is_none() {
            return;
        }
        let mut extra = self
            .sensitive_headers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(headers) = options.sensitive_headers {
            *extra = headers;
        }
        let redactor = HeaderRedactor::new(extra.iter());
        self.policy.rcu(|current| CapturePolicy {
            redactor: redactor.clone(),
            truncator: options
                .max_body_length
                .map_or(current.truncator, BodyTruncator::new),
            max_buffer_bytes: current.max_buffer_bytes,
        });
        tracing::info!(
            sensitive_headers = extra.len(),
            max_body_length = self.policy.load().truncator.max_length(),
            "Capture policy updated"
        );
    }

    /// Apply a reloaded configuration file.
    pub fn apply_config(&self, config: &InspectorConfig) {
        self.store.set_enabled(config.store.enabled);
        self.configure(InspectorOptions {
            max_capacity: Some(config.store.max_capacity),
            sensitive_headers: Some(config.capture.sensitive_headers.clone()),
            max_body_length: Some(config.capture.max_body_length),
        });
        let max_buffer_bytes = config.capture.max_buffer_bytes;
        self.policy.rcu(|current| CapturePolicy {
            max_buffer_bytes,
            ..(**current).clone()
        });
        self.failure_hook.configure(&config.failure_hook);
    }

    // Consumer API

    pub fn list(&self, filter: EventFilter) -> Vec<Arc<Event>> {
        self.store.list(filter)
    }

    pub fn count(&self) -> usize {
        self.store.count()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    /// The current snapshot as a JSON array, oldest first.
    pub fn events_json(&self, filter: EventFilter) -> Result<String, serde_json::Error> {
        let events = self.store.list(filter);
        let refs: Vec<&Event> = events.iter().map(|e| e.as_ref()).collect();
        serde_json::to_string(&refs)
    }

    // Installation API

    pub fn install_failure_hook(&self) -> bool {
        self.failure_hook.install()
    }

    pub fn restore_failure_hook(&self) -> bool {
        self.failure_hook.restore()
    }

    pub fn failure_hook(&self) -> &FailureHook {
        &self.failure_hook
    }

    /// The layer for the middleware surface. It observes only while that
    /// surface is installed.
    pub fn middleware_layer(&self) -> InspectorLayer {
        let sink = CaptureSink::new(self.store.clone(), self.tracker.clone(), self.policy.clone());
        InspectorLayer::new(sink, self.middleware_attached.clone())
    }

    /// Install one surface. A surface whose facility is absent from
    /// `targets` is skipped and reported as not installed.
    pub fn install_transport(&self, surface: Surface, targets: &TransportTargets) -> bool {
        if !self.store.is_enabled() {
            tracing::debug!(surface = %surface, "Event store disabled, interceptor not installed");
            return false;
        }
        let installed = match surface {
            Surface::Middleware => !self.middleware_attached.swap(true, Ordering::AcqRel),
            Surface::Fetch => match &targets.fetch {
                Some(slot) => self.fetch.install(slot),
                None => false,
            },
            Surface::RequestObject => match &targets.request_object {
                Some(slot) => self.request_object.install(slot),
                None => false,
            },
        };
        if !installed {
            tracing::debug!(surface = %surface, "Interceptor not installed");
        }
        installed
    }

    pub fn restore_transport(&self, surface: Surface) -> bool {
        match surface {
            Surface::Middleware => self.middleware_attached.swap(false, Ordering::AcqRel),
            Surface::Fetch => self.fetch.restore(),
            Surface::RequestObject => self.request_object.restore(),
        }
    }

    /// Install every surface available in `targets`. Returns the ones installed.
    pub fn install_all_transports(&self, targets: &TransportTargets) -> Vec<Surface> {
        Surface::ALL
            .into_iter()
            .filter(|surface| self.install_transport(*surface, targets))
            .collect()
    }

    pub fn restore_all_transports(&self) -> Vec<Surface> {
        Surface::ALL
            .into_iter()
            .filter(|surface| self.restore_transport(*surface))
            .collect()
    }

    pub fn is_installed(&self, surface: Surface) -> bool {
        match surface {
            Surface::Middleware => self.middleware_attached.load(Ordering::Acquire),
            Surface::Fetch => self.fetch.is_installed(),
            Surface::RequestObject => self.request_object.is_installed(),
        }
    }
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new(&InspectorConfig::default())
    }
}

impl std::fmt::Debug for Inspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inspector")
            .field("store", &self.store)
            .field("in_flight", &self.tracker.in_flight())
            .field("failure_hook", &self.failure_hook)
            .finish()
    }
}
