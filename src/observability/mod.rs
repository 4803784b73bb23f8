//! Observability of the inspector itself.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and gauges via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing a subscriber or recorder is the binary's job
//! - Never log header values or bodies, only ids, methods, URLs and counts
//! - Metric updates are no-ops when no recorder is installed

pub mod logging;
pub mod metrics;
