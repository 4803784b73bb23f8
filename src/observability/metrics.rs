//! Metrics collection and exposition.
//!
//! # Metrics
//! - `inspector_events_recorded_total` (counter): stored events by kind
//! - `inspector_events_evicted_total` (counter): events dropped by FIFO eviction
//! - `inspector_events_dropped_total` (counter): events never stored, by reason
//! - `inspector_subscriber_panics_total` (counter): isolated subscriber panics
//! - `inspector_store_size` (gauge): current event count
//! - `inspector_inflight_calls` (gauge): correlation entries awaiting completion

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_event(kind: &'static str) {
    counter!("inspector_events_recorded_total", "kind" => kind).increment(1);
}

pub fn record_evictions(count: usize) {
    counter!("inspector_events_evicted_total").increment(count as u64);
}

pub fn record_event_dropped(reason: &'static str) {
    counter!("inspector_events_dropped_total", "reason" => reason).increment(1);
}

pub fn record_subscriber_panic() {
    counter!("inspector_subscriber_panics_total").increment(1);
}

pub fn record_store_size(size: usize) {
    gauge!("inspector_store_size").set(size as f64);
}

pub fn record_inflight(count: usize) {
    gauge!("inspector_inflight_calls").set(count as f64);
}
