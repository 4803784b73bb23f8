//! Subscriber registry and notification.
//!
//! Callbacks take no arguments: a subscriber re-reads the store when told
//! something changed. Every invocation is isolated so one panicking
//! subscriber cannot keep the others from being notified.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::observability::metrics;

pub(crate) type Callback = Arc<dyn Fn() + Send + Sync>;

thread_local! {
    /// Registries with a notification pass running on this thread, by address.
    static NOTIFYING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Whether this thread is currently running subscriber callbacks of any store.
pub(crate) fn notifying_on_current_thread() -> bool {
    NOTIFYING.with(|active| !active.borrow().is_empty())
}

/// Identifier of one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle returned by [`EventStore::subscribe`](crate::store::EventStore::subscribe).
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Deregister the callback. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, Callback)>>,
    /// Set when a mutation happened while this thread was already notifying.
    pending: AtomicBool,
}

impl SubscriberRegistry {
    pub(crate) fn register(self: &Arc<Self>, callback: Callback) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        tracing::debug!(subscription = %id, "Subscriber registered");
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if removed {
            tracing::debug!(subscription = %id, "Subscriber removed");
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn snapshot(&self) -> Vec<Callback> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect()
    }

    /// Invoke every current subscriber once.
    ///
    /// Must be called without any store lock held. A mutation of the same
    /// store made from inside one of its callbacks on the same thread does
    /// not recurse; it schedules one more pass after the current one
    /// finishes. Other stores notify normally.
    pub(crate) fn notify(&self) {
        let Some(_pass) = PassGuard::enter(self) else {
            self.pending.store(true, Ordering::Release);
            return;
        };
        loop {
            for callback in self.snapshot() {
                if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                    tracing::warn!("Event subscriber panicked; continuing with remaining subscribers");
                    metrics::record_subscriber_panic();
                }
            }
            if !self.pending.swap(false, Ordering::AcqRel) {
                break;
            }
        }
    }
}

/// Marks one registry as notifying on this thread.
struct PassGuard(usize);

impl PassGuard {
    /// `None` if `registry` already has a pass running on this thread.
    fn enter(registry: &SubscriberRegistry) -> Option<Self> {
        let key = registry as *const SubscriberRegistry as usize;
        NOTIFYING.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&key) {
                return None;
            }
            active.push(key);
            Some(PassGuard(key))
        })
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        NOTIFYING.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|k| *k == self.0) {
                active.swap_remove(pos);
            }
        });
    }
}
