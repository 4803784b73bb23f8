//! What an uncaught failure looks like to a handler.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::PanicHookInfo;

use serde_json::{json, Value};

/// The value a failure was raised with.
#[derive(Debug)]
pub enum RaisedValue {
    /// A native error; its `Display` output is the message.
    Error(Box<dyn std::error::Error + Send + Sync>),
    /// A plain string.
    Text(String),
    /// An arbitrary structured value.
    Structured(Value),
    /// Anything else, identified only by its type name.
    Opaque(&'static str),
}

impl RaisedValue {
    /// Classify a panic payload. `&str` and `String` are text, everything else is opaque.
    pub fn from_panic_payload(payload: &(dyn Any + Send)) -> Self {
        if let Some(text) = payload.downcast_ref::<&'static str>() {
            RaisedValue::Text((*text).to_string())
        } else if let Some(text) = payload.downcast_ref::<String>() {
            RaisedValue::Text(text.clone())
        } else {
            RaisedValue::Opaque("Box<dyn Any>")
        }
    }

    pub fn message(&self) -> String {
        match self {
            RaisedValue::Error(error) => error.to_string(),
            RaisedValue::Text(text) => text.clone(),
            RaisedValue::Structured(value) => match value.get("message").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => value.to_string(),
            },
            RaisedValue::Opaque(type_name) => format!("Unknown error ({})", type_name),
        }
    }
}

impl From<String> for RaisedValue {
    fn from(text: String) -> Self {
        RaisedValue::Text(text)
    }
}

impl From<&str> for RaisedValue {
    fn from(text: &str) -> Self {
        RaisedValue::Text(text.to_string())
    }
}

impl From<Value> for RaisedValue {
    fn from(value: Value) -> Self {
        RaisedValue::Structured(value)
    }
}

/// One uncaught failure, as delivered to a failure handler.
#[derive(Debug)]
pub struct Failure<'a> {
    pub value: RaisedValue,
    /// The failure cannot be recovered from (the process is going down).
    pub is_fatal: bool,
    pub stack_trace: Option<String>,
    /// Set when the failure is a panic seen by the panic hook.
    pub panic: Option<&'a PanicHookInfo<'a>>,
}

impl<'a> Failure<'a> {
    pub fn new(value: impl Into<RaisedValue>) -> Self {
        Self {
            value: value.into(),
            is_fatal: false,
            stack_trace: None,
            panic: None,
        }
    }

    pub fn fatal(mut self, is_fatal: bool) -> Self {
        self.is_fatal = is_fatal;
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Describe a panic. Panics on the `main` thread are fatal.
    pub fn from_panic(info: &'a PanicHookInfo<'a>) -> Self {
        let backtrace = Backtrace::capture();
        let stack_trace = match backtrace.status() {
            BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        Self {
            value: RaisedValue::from_panic_payload(info.payload()),
            is_fatal: std::thread::current().name() == Some("main"),
            stack_trace,
            panic: Some(info),
        }
    }

    /// Extra data stored with the error event.
    pub fn cause(&self) -> Option<Value> {
        if let RaisedValue::Structured(value) = &self.value {
            return Some(value.clone());
        }
        let info = self.panic?;
        let thread = std::thread::current();
        Some(json!({
            "thread": thread.name().unwrap_or("<unnamed>"),
            "location": info.location().map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_message_extraction() {
        assert_eq!(RaisedValue::Error(Box::new(DiskFull)).message(), "disk full");
        assert_eq!(RaisedValue::from("plain").message(), "plain");
        assert_eq!(
            RaisedValue::from(json!({"message": "bad state", "code": 7})).message(),
            "bad state"
        );
        assert_eq!(RaisedValue::from(json!({"code": 7})).message(), r#"{"code":7}"#);
        assert_eq!(RaisedValue::Opaque("u32").message(), "Unknown error (u32)");
    }

    #[test]
    fn test_panic_payload_classification() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("boom"));
        let number: Box<dyn Any + Send> = Box::new(42u32);

        assert_eq!(RaisedValue::from_panic_payload(text.as_ref()).message(), "boom");
        assert_eq!(RaisedValue::from_panic_payload(owned.as_ref()).message(), "boom");
        assert!(matches!(
            RaisedValue::from_panic_payload(number.as_ref()),
            RaisedValue::Opaque(_)
        ));
    }

    #[test]
    fn test_builder() {
        let failure = Failure::new("x").fatal(true).with_stack_trace("at main");
        assert!(failure.is_fatal);
        assert_eq!(failure.stack_trace.as_deref(), Some("at main"));
        assert!(failure.cause().is_none());
        assert!(Failure::new(json!({"a": 1})).cause().is_some());
    }
}
