//! Event store subsystem.
//!
//! # Data Flow
//! ```text
//! Producers (manual API, interceptors, failure hook)
//!     → EventDraft (message + kind-specific payload)
//!     → buffer.rs (assign id/timestamp, append, evict oldest)
//!     → subscription.rs (notify every subscriber, isolated)
//!
//! Consumers:
//!     → list(filter) snapshot, oldest first
//!     → count()
//!     → subscribe(callback) → Subscription
//! ```
//!
//! # Design Decisions
//! - The store is the only place events are mutated
//! - Notify-after-mutate: subscribers re-read instead of tracking diffs
//! - Eviction happens before subscribers are told about the new event

pub mod buffer;
pub mod event;
pub mod filter;
pub mod subscription;

pub use buffer::{EventStore, StoreOptions, DEFAULT_MAX_CAPACITY};
pub use event::{Event, EventDraft, EventId, EventKind, EventPayload, HeaderSnapshot, NetworkFields};
pub use filter::EventFilter;
pub use subscription::{Subscription, SubscriptionId};
