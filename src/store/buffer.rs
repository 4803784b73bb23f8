//! Bounded, ordered event store.
//!
//! # Responsibilities
//! - Assign ids and timestamps, append, evict oldest beyond capacity
//! - Serve filtered snapshots in insertion order
//! - Notify subscribers after every mutation
//!
//! # Design Decisions
//! - Each operation is one critical section; ids are assigned under the lock
//!   so id order is insertion order
//! - Subscribers run after the lock is released and may read the store
//! - Events are shared as `Arc<Event>`; nothing hands out `&mut Event`

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::StoreConfig;
use crate::observability::metrics;
use crate::store::event::{now_millis, Event, EventDraft, EventId, NetworkFields};
use crate::store::filter::EventFilter;
use crate::store::subscription::{SubscriberRegistry, Subscription};

/// Default retention bound.
pub const DEFAULT_MAX_CAPACITY: usize = 100;

/// Live-tunable store options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub max_capacity: Option<usize>,
}

struct StoreState {
    events: VecDeque<Arc<Event>>,
    max_capacity: usize,
    next_id: u64,
}

impl StoreState {
    /// Drop oldest events until the bound holds. Returns how many were dropped.
    fn enforce_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.events.len() > self.max_capacity {
            self.events.pop_front();
            evicted += 1;
        }
        evicted
    }
}

/// The single shared event log.
pub struct EventStore {
    state: Mutex<StoreState>,
    enabled: AtomicBool,
    subscribers: Arc<SubscriberRegistry>,
}

impl EventStore {
    /// Create a store from configuration.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            state: Mutex::new(StoreState {
                events: VecDeque::with_capacity(config.max_capacity.clamp(1, 1024)),
                max_capacity: config.max_capacity.max(1),
                next_id: 1,
            }),
            enabled: AtomicBool::new(config.enabled),
            subscribers: Arc::new(SubscriberRegistry::default()),
        }
    }

    /// Create an enabled store with the given bound.
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self::new(&StoreConfig {
            enabled: true,
            max_capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Host override of the enabled flag.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        tracing::info!(enabled, "Event store enablement overridden");
    }

    /// Store an event. Returns `None` without notifying when the store is disabled.
    pub fn record(&self, draft: EventDraft) -> Option<Arc<Event>> {
        if !self.is_enabled() {
            metrics::record_event_dropped("disabled");
            return None;
        }

        let kind = draft.kind();
        let (event, evicted, size) = {
            let mut state = self.lock();
            let id = EventId(state.next_id);
            state.next_id += 1;
            let event = Arc::new(Event {
                id,
                timestamp: now_millis(),
                message: draft.message,
                payload: draft.payload,
            });
            state.events.push_back(event.clone());
            let evicted = state.enforce_capacity();
            (event, evicted, state.events.len())
        };

        metrics::record_event(kind.as_str());
        if evicted > 0 {
            metrics::record_evictions(evicted);
        }
        metrics::record_store_size(size);
        tracing::trace!(id = %event.id, kind = %kind, "Event recorded");

        self.subscribers.notify();
        Some(event)
    }

    pub fn info(&self, message: impl Into<String>, data: Option<Value>) -> Option<Arc<Event>> {
        self.record(EventDraft::info(message, data))
    }

    pub fn warn(&self, message: impl Into<String>, data: Option<Value>) -> Option<Arc<Event>> {
        self.record(EventDraft::warn(message, data))
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        cause: Option<Value>,
        stack_trace: Option<String>,
    ) -> Option<Arc<Event>> {
        self.record(EventDraft::error(message, cause, stack_trace))
    }

    /// Record a network event directly, bypassing interception.
    pub fn network(&self, fields: NetworkFields) -> Option<Arc<Event>> {
        self.record(EventDraft::network(fields))
    }

    /// Snapshot of matching events, oldest first.
    pub fn list(&self, filter: EventFilter) -> Vec<Arc<Event>> {
        self.lock()
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// The newest event, if any.
    pub fn latest(&self) -> Option<Arc<Event>> {
        self.lock().events.back().cloned()
    }

    /// Empty the store and notify subscribers once.
    pub fn clear(&self) {
        let cleared = {
            let mut state = self.lock();
            let n = state.events.len();
            state.events.clear();
            n
        };
        metrics::record_store_size(0);
        tracing::debug!(cleared, "Event store cleared");
        self.subscribers.notify();
    }

    pub fn count(&self) -> usize {
        self.lock().events.len()
    }

    pub fn capacity(&self) -> usize {
        self.lock().max_capacity
    }

    /// Register a zero-argument change callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribers.register(Arc::new(callback))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Apply live options. A smaller bound evicts oldest events immediately.
    /// A bound of zero is raised to one.
    pub fn configure(&self, options: StoreOptions) {
        let Some(requested) = options.max_capacity else {
            return;
        };
        let max_capacity = requested.max(1);
        if max_capacity != requested {
            tracing::warn!(requested, max_capacity, "Event store capacity must be at least 1");
        }
        let (evicted, size) = {
            let mut state = self.lock();
            state.max_capacity = max_capacity;
            let evicted = state.enforce_capacity();
            (evicted, state.events.len())
        };
        tracing::info!(max_capacity, evicted, "Event store reconfigured");
        if evicted > 0 {
            metrics::record_evictions(evicted);
            metrics::record_store_size(size);
        }
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EventStore")
            .field("enabled", &self.is_enabled())
            .field("count", &state.events.len())
            .field("max_capacity", &state.max_capacity)
            .finish()
    }
}
