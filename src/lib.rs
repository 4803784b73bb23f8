//! In-process diagnostic instrumentation.
//!
//! Captures manual log events, outbound network calls and uncaught failures
//! into one bounded, ordered event store that viewers subscribe to.

pub mod capture;
pub mod config;
pub mod correlation;
pub mod failure;
pub mod inspector;
pub mod intercept;
pub mod observability;
pub mod store;

pub use config::schema::InspectorConfig;
pub use inspector::{Inspector, InspectorOptions, TransportTargets};
pub use intercept::Surface;
pub use store::{Event, EventFilter, EventStore};
