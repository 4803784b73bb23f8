//! Event data model.
//!
//! One stored record shape, specialized per source through [`EventPayload`].
//! Serialized with `kind` as the tag and camelCase field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Header name (lower-case) → header value, sensitive values already redacted.
pub type HeaderSnapshot = BTreeMap<String, String>;

/// Process-unique, monotonically assigned event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub(crate) u64);

impl EventId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// Event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Info,
    Warn,
    Error,
    Network,
}

impl EventKind {
    /// Stable lower-case name, used as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Info => "info",
            EventKind::Warn => "warn",
            EventKind::Error => "error",
            EventKind::Network => "network",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields of a completed outbound call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFields {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Elapsed milliseconds between call start and completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HeaderSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HeaderSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
    /// Failure description when the call never produced a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NetworkFields {
    /// Create fields for a call with the given method and URL.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// One-line summary: `"<METHOD> <STATUS-OR-ERROR> <URL>"`.
    pub fn summary(&self) -> String {
        let outcome = match self.status_code {
            Some(status) => status.to_string(),
            None => "ERROR".to_string(),
        };
        format!("{} {} {}", self.method.to_uppercase(), outcome, self.url)
    }
}

/// Kind-specific part of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventPayload {
    Info {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Warn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Error {
        /// The raw error or cause.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, rename = "stackTrace", skip_serializing_if = "Option::is_none")]
        stack_trace: Option<String>,
    },
    Network(NetworkFields),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Info { .. } => EventKind::Info,
            EventPayload::Warn { .. } => EventKind::Warn,
            EventPayload::Error { .. } => EventKind::Error,
            EventPayload::Network(_) => EventKind::Network,
        }
    }
}

/// A stored event. Immutable once it is in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub message: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Network fields, if this is a network event.
    pub fn network(&self) -> Option<&NetworkFields> {
        match &self.payload {
            EventPayload::Network(fields) => Some(fields),
            _ => None,
        }
    }
}

/// An event before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub message: String,
    pub payload: EventPayload,
}

impl EventDraft {
    pub fn info(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            message: message.into(),
            payload: EventPayload::Info { data },
        }
    }

    pub fn warn(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            message: message.into(),
            payload: EventPayload::Warn { data },
        }
    }

    pub fn error(message: impl Into<String>, cause: Option<Value>, stack_trace: Option<String>) -> Self {
        Self {
            message: message.into(),
            payload: EventPayload::Error {
                data: cause,
                stack_trace,
            },
        }
    }

    /// Network draft; the message is derived from the fields.
    pub fn network(fields: NetworkFields) -> Self {
        Self {
            message: fields.summary(),
            payload: EventPayload::Network(fields),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_network_summary() {
        let mut fields = NetworkFields::new("get", "https://x/users");
        fields.status_code = Some(200);
        assert_eq!(fields.summary(), "GET 200 https://x/users");

        let failed = NetworkFields::new("post", "https://x/login");
        assert_eq!(failed.summary(), "POST ERROR https://x/login");
    }

    #[test]
    fn test_serialized_shape() {
        let mut fields = NetworkFields::new("GET", "https://x/users");
        fields.status_code = Some(404);
        let event = Event {
            id: EventId(7),
            timestamp: 1_700_000_000_000,
            message: fields.summary(),
            payload: EventPayload::Network(fields),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["kind"], json!("network"));
        assert_eq!(value["statusCode"], json!(404));
        assert!(value.get("duration").is_none());

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_error_stack_trace_field_name() {
        let draft = EventDraft::error("boom", Some(json!({"code": 1})), Some("at main".into()));
        let event = Event {
            id: EventId(1),
            timestamp: 0,
            message: draft.message,
            payload: draft.payload,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], json!("error"));
        assert_eq!(value["stackTrace"], json!("at main"));
        assert_eq!(value["data"]["code"], json!(1));
    }
}
