//! Uncaught failure capture.
//!
//! # Data Flow
//! ```text
//! panic / host-reported failure
//!     → facility.rs (registered handler)
//!         → previous handler (contained)
//!         → hook.rs (message extraction, denylist, fatal marker)
//!     → EventStore::error
//! ```

pub mod facility;
pub mod hook;
pub mod report;

pub use facility::{FailureFacility, FailureHandler, HandlerSlot, NoFacility, PanicHookFacility, Unavailable};
pub use hook::{FailureHook, DEFAULT_IGNORE_PATTERNS, FATAL_PREFIX};
pub use report::{Failure, RaisedValue};
