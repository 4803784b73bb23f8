//! Process-wide failure handler registries.
//!
//! A facility owns "the" handler for uncaught failures in some host. The hook
//! takes the current handler out, keeps it as the previous one, and puts its
//! own in. A host without such a registry is represented by [`NoFacility`].

use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use super::report::Failure;

pub type FailureHandler = Arc<dyn Fn(&Failure<'_>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("failure handler facility is not available in this host")]
pub struct Unavailable;

/// A global registry holding at most one failure handler.
pub trait FailureFacility: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Remove and return the registered handler. `Ok(None)` means the
    /// facility exists but its default behavior is in effect.
    fn take_handler(&self) -> Result<Option<FailureHandler>, Unavailable>;

    /// Register `handler`, or the facility's default when `None`.
    fn set_handler(&self, handler: Option<FailureHandler>) -> Result<(), Unavailable>;
}

type RawPanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// The process panic hook (`std::panic::set_hook`).
///
/// Handlers taken from it are only callable for failures that carry panic
/// info; the default hook prints to stderr as usual.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicHookFacility;

impl FailureFacility for PanicHookFacility {
    fn name(&self) -> &'static str {
        "panic_hook"
    }

    fn take_handler(&self) -> Result<Option<FailureHandler>, Unavailable> {
        if std::thread::panicking() {
            return Err(Unavailable);
        }
        let raw: RawPanicHook = panic::take_hook();
        let handler: FailureHandler = Arc::new(move |failure: &Failure<'_>| {
            if let Some(info) = failure.panic {
                raw(info);
            }
        });
        Ok(Some(handler))
    }

    fn set_handler(&self, handler: Option<FailureHandler>) -> Result<(), Unavailable> {
        if std::thread::panicking() {
            return Err(Unavailable);
        }
        match handler {
            Some(handler) => panic::set_hook(Box::new(move |info| handler(&Failure::from_panic(info)))),
            // Dropping the taken hook reinstates the default one.
            None => drop(panic::take_hook()),
        }
        Ok(())
    }
}

/// An application-owned handler slot for failures the host reports itself,
/// such as errors surfaced from detached task join handles.
#[derive(Default)]
pub struct HandlerSlot {
    handler: RwLock<Option<FailureHandler>>,
}

impl HandlerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a failure to the registered handler. Returns false if none is registered.
    pub fn report(&self, failure: &Failure<'_>) -> bool {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => {
                handler(failure);
                true
            }
            None => false,
        }
    }

    pub fn is_set(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl FailureFacility for HandlerSlot {
    fn name(&self) -> &'static str {
        "handler_slot"
    }

    fn take_handler(&self) -> Result<Option<FailureHandler>, Unavailable> {
        Ok(self.handler.write().unwrap_or_else(PoisonError::into_inner).take())
    }

    fn set_handler(&self, handler: Option<FailureHandler>) -> Result<(), Unavailable> {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
        Ok(())
    }
}

impl std::fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSlot").field("set", &self.is_set()).finish()
    }
}

/// A host with no global failure handler registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFacility;

impl FailureFacility for NoFacility {
    fn name(&self) -> &'static str {
        "none"
    }

    fn take_handler(&self) -> Result<Option<FailureHandler>, Unavailable> {
        Err(Unavailable)
    }

    fn set_handler(&self, _handler: Option<FailureHandler>) -> Result<(), Unavailable> {
        Err(Unavailable)
    }
}
