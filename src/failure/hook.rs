//! Uncaught failure hook.
//!
//! # State
//! ```text
//! Uninstalled ──install()──▶ Pending ──delay elapsed──▶ Installed
//!      ▲                        │                          │
//!      └────────restore()───────┴──────────restore()───────┘
//! ```
//!
//! # Design Decisions
//! - The previous handler always runs first; a panic inside it is contained
//! - The hook holds only a weak reference to its state, so a dropped hook
//!   left installed in the facility just chains to the previous handler
//! - Failures raised by subscribers during notification are already
//!   contained by the store and are not recorded again

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::runtime::Handle;

use super::facility::{FailureFacility, FailureHandler, PanicHookFacility};
use super::report::Failure;
use crate::config::FailureHookConfig;
use crate::observability::metrics;
use crate::store::{subscription, EventStore};

/// Prefix of the message of a failure that brings the process down.
pub const FATAL_PREFIX: &str = "[FATAL] ";

/// Runtime-internal noise that is never recorded.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "A Tokio 1.x context was found, but it is being shutdown",
    "cannot access a Thread Local Storage value during or after destruction",
    "failed printing to stdout",
];

#[derive(Default)]
struct HookState {
    installed: bool,
    previous: Option<FailureHandler>,
}

struct HookInner {
    store: Arc<EventStore>,
    facility: Arc<dyn FailureFacility>,
    install_delay: RwLock<Duration>,
    ignore_patterns: RwLock<Vec<String>>,
    state: Mutex<HookState>,
    /// True while our handler is registered with the facility.
    active: AtomicBool,
    /// Bumped by every install and restore; a deferred install only runs
    /// if the epoch it was scheduled under is still current.
    epoch: AtomicU64,
}

/// Records uncaught failures as error events, chaining to the handler it replaced.
pub struct FailureHook {
    inner: Arc<HookInner>,
}

impl FailureHook {
    /// A hook on the process panic hook.
    pub fn new(store: Arc<EventStore>, config: &FailureHookConfig) -> Self {
        Self::with_facility(store, Arc::new(PanicHookFacility), config)
    }

    pub fn with_facility(
        store: Arc<EventStore>,
        facility: Arc<dyn FailureFacility>,
        config: &FailureHookConfig,
    ) -> Self {
        Self {
            inner: Arc::new(HookInner {
                store,
                facility,
                install_delay: RwLock::new(Duration::from_millis(config.install_delay_ms)),
                ignore_patterns: RwLock::new(config.ignore_patterns.clone()),
                state: Mutex::new(HookState::default()),
                active: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Whether `install` has been called without a matching `restore`.
    pub fn is_installed(&self) -> bool {
        self.inner.lock_state().installed
    }

    /// Whether the handler is registered with the facility right now.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Replace the denylist and install delay.
    pub fn configure(&self, config: &FailureHookConfig) {
        *self
            .inner
            .install_delay
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Duration::from_millis(config.install_delay_ms);
        *self
            .inner
            .ignore_patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config.ignore_patterns.clone();
    }

    /// Schedule installation. No-op when already installed or the store is disabled.
    ///
    /// The handler is registered after the configured delay on the current
    /// tokio runtime, or right away outside a runtime.
    pub fn install(&self) -> bool {
        if !self.inner.store.is_enabled() {
            tracing::debug!("Event store disabled, failure hook not installed");
            return false;
        }

        let epoch = {
            let mut state = self.inner.lock_state();
            if state.installed {
                return false;
            }
            state.installed = true;
            self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1
        };

        let delay = *self
            .inner
            .install_delay
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match Handle::try_current() {
            Ok(runtime) if !delay.is_zero() => {
                let inner = self.inner.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.activate(epoch);
                });
                tracing::debug!(delay_ms = delay.as_millis() as u64, "Failure hook install deferred");
            }
            _ => self.inner.activate(epoch),
        }
        true
    }

    /// Put the previous handler back. Cancels a pending install.
    pub fn restore(&self) -> bool {
        let mut state = self.inner.lock_state();
        let was_installed = std::mem::take(&mut state.installed);
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);

        if self.inner.active.swap(false, Ordering::AcqRel) {
            let previous = state.previous.take();
            if let Err(e) = self.inner.facility.set_handler(previous) {
                tracing::debug!(facility = self.inner.facility.name(), error = %e, "Failure hook restore skipped");
            } else {
                tracing::info!(facility = self.inner.facility.name(), "Failure hook restored");
            }
        }
        was_installed
    }
}

impl HookInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, HookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn activate(self: &Arc<Self>, epoch: u64) {
        let mut state = self.lock_state();
        if !state.installed || self.epoch.load(Ordering::Acquire) != epoch {
            tracing::debug!("Failure hook install cancelled");
            return;
        }

        let previous = match self.facility.take_handler() {
            Ok(previous) => previous,
            Err(e) => {
                tracing::debug!(facility = self.facility.name(), error = %e, "Failure hook not installed");
                state.installed = false;
                return;
            }
        };

        let handler = chained_handler(Arc::downgrade(self), previous.clone());
        if let Err(e) = self.facility.set_handler(Some(handler)) {
            tracing::debug!(facility = self.facility.name(), error = %e, "Failure hook not installed");
            state.installed = false;
            return;
        }
        state.previous = previous;
        self.active.store(true, Ordering::Release);
        tracing::info!(facility = self.facility.name(), "Failure hook installed");
    }

    fn handle(&self, failure: &Failure<'_>) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        if subscription::notifying_on_current_thread() {
            return;
        }

        let message = failure.value.message();
        let ignored = self
            .ignore_patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|pattern| message.contains(pattern.as_str()));
        if ignored {
            metrics::record_event_dropped("denylisted");
            return;
        }

        let message = if failure.is_fatal {
            format!("{}{}", FATAL_PREFIX, message)
        } else {
            message
        };
        self.store.error(message, failure.cause(), failure.stack_trace.clone());
    }
}

fn chained_handler(hook: Weak<HookInner>, previous: Option<FailureHandler>) -> FailureHandler {
    Arc::new(move |failure: &Failure<'_>| {
        if let Some(previous) = &previous {
            if catch_unwind(AssertUnwindSafe(|| previous(failure))).is_err() {
                tracing::warn!("Previous failure handler panicked");
            }
        }
        if let Some(hook) = hook.upgrade() {
            hook.handle(failure);
        }
    })
}

impl std::fmt::Debug for FailureHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureHook")
            .field("facility", &self.inner.facility.name())
            .field("installed", &self.is_installed())
            .field("active", &self.is_active())
            .finish()
    }
}
