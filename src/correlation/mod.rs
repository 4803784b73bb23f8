//! Call correlation.
//!
//! # Data Flow
//! ```text
//! call starts    → tracker.rs begin(method, url) → CorrelationId (start time stored)
//! call completes → tracker.rs finish(id) → elapsed (entry removed)
//!
//! custom transports → timer.rs NetworkTimer start()/end()
//! ```
//!
//! # Design Decisions
//! - Each id is written once and consumed once; a finished id cannot be finished again
//! - The map is bounded by concurrent in-flight calls; a call that never
//!   completes leaves one entry behind until `sweep`

pub mod timer;
pub mod tracker;

pub use timer::NetworkTimer;
pub use tracker::{CorrelationId, CorrelationTracker};
