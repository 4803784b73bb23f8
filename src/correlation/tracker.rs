//! In-flight call tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::observability::metrics;
use crate::store::event::now_millis;

/// Key linking a call's start to its completion.
///
/// Built from method, URL, start timestamp and a process-local sequence
/// number, so two identical calls in the same millisecond stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    fn new(method: &str, url: &str, timestamp: u64, seq: u64) -> Self {
        Self(format!("{} {} @{}#{}", method.to_uppercase(), url, timestamp, seq).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps in-flight call ids to their start time.
#[derive(Debug, Default)]
pub struct CorrelationTracker {
    entries: DashMap<CorrelationId, Instant>,
    seq: AtomicU64,
}

impl CorrelationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call start and return its id.
    pub fn begin(&self, method: &str, url: &str) -> CorrelationId {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let id = CorrelationId::new(method, url, now_millis(), seq);
        self.entries.insert(id.clone(), Instant::now());
        metrics::record_inflight(self.entries.len());
        tracing::trace!(correlation_id = %id, "Call started");
        id
    }

    /// Consume a call's entry and return the time since it started.
    ///
    /// Returns `None` if the id is unknown or was already finished.
    pub fn finish(&self, id: &CorrelationId) -> Option<Duration> {
        let (_, started) = self.entries.remove(id)?;
        metrics::record_inflight(self.entries.len());
        Some(started.elapsed())
    }

    /// Number of calls started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.entries.len()
    }

    /// Best-effort cleanup of entries older than `max_age`. Returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, started| started.elapsed() < max_age);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept stale correlation entries");
            metrics::record_inflight(self.entries.len());
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_finish_consumes_once() {
        let tracker = CorrelationTracker::new();
        let id = tracker.begin("get", "https://x/users");
        assert!(id.as_str().starts_with("GET https://x/users @"));
        assert_eq!(tracker.in_flight(), 1);

        assert!(tracker.finish(&id).is_some());
        assert_eq!(tracker.in_flight(), 0);
        assert!(tracker.finish(&id).is_none());
    }

    #[test]
    fn test_identical_calls_get_distinct_ids() {
        let tracker = CorrelationTracker::new();
        let a = tracker.begin("GET", "https://x");
        let b = tracker.begin("GET", "https://x");
        assert_ne!(a, b);
        assert_eq!(tracker.in_flight(), 2);
    }

    #[test]
    fn test_elapsed_measured() {
        let tracker = CorrelationTracker::new();
        let id = tracker.begin("GET", "https://x");
        std::thread::sleep(Duration::from_millis(20));
        let elapsed = tracker.finish(&id).unwrap();
        assert!(elapsed >= Duration::from_millis(20));
    }

    #[test]
    fn test_sweep() {
        let tracker = CorrelationTracker::new();
        let _stale = tracker.begin("GET", "https://x/hang");
        std::thread::sleep(Duration::from_millis(15));
        let fresh = tracker.begin("GET", "https://x/ok");

        assert_eq!(tracker.sweep(Duration::from_millis(10)), 1);
        assert_eq!(tracker.in_flight(), 1);
        assert!(tracker.finish(&fresh).is_some());
    }
}
