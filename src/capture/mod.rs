//! Capture policies shared by every transport surface.
//!
//! # Data Flow
//! ```text
//! interceptor observes a call
//!     → redaction.rs (headers → HeaderSnapshot, sensitive values masked)
//!     → body.rs (bytes → JSON value or text)
//!     → truncation.rs (bound serialized length)
//!     → NetworkFields → EventStore::network
//! ```
//!
//! # Design Decisions
//! - Pure functions: nothing here touches the store or the transport
//! - Policies are applied before an event exists; stored events are never edited
//! - One `CapturePolicy` value is swapped atomically on reconfiguration

pub mod body;
pub mod redaction;
pub mod truncation;

use std::time::Duration;

use serde_json::Value;

use crate::config::CaptureConfig;
use crate::store::{HeaderSnapshot, NetworkFields};

pub use body::{parse_request_body, parse_response_body};
pub use redaction::{HeaderRedactor, DEFAULT_SENSITIVE_HEADERS, REDACTION_MARKER};
pub use truncation::{BodyTruncator, DEFAULT_MAX_BODY_LENGTH, TRUNCATION_MARKER};

/// Generic description used when a call failed without a usable error.
pub const GENERIC_FAILURE: &str = "Network request failed";

/// Redaction + truncation settings in effect for new captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePolicy {
    pub redactor: HeaderRedactor,
    pub truncator: BodyTruncator,
    /// Upper bound on bytes buffered by the middleware surface per body.
    pub max_buffer_bytes: usize,
}

impl CapturePolicy {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            redactor: HeaderRedactor::new(&config.sensitive_headers),
            truncator: BodyTruncator::new(config.max_body_length),
            max_buffer_bytes: config.max_buffer_bytes,
        }
    }

    /// Assemble the fields of a finished call, truncating both bodies.
    pub fn finish(&self, call: CallCapture, outcome: CallOutcome, elapsed: Option<Duration>) -> NetworkFields {
        let mut fields = NetworkFields::new(call.method.to_uppercase(), call.url);
        fields.duration = elapsed.map(|d| d.as_millis() as u64);
        fields.request_headers = call.request_headers;
        fields.request_body = call.request_body.map(|b| self.truncator.truncate(b));

        match outcome {
            CallOutcome::Response { status, headers, body } => {
                fields.status_code = Some(status);
                fields.response_headers = Some(headers);
                fields.response_body = body.map(|b| self.truncator.truncate(b));
            }
            CallOutcome::Failed { error } => {
                fields.error = Some(if error.is_empty() {
                    GENERIC_FAILURE.to_string()
                } else {
                    error
                });
            }
        }
        fields
    }
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

/// What was observed when a call started.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallCapture {
    pub method: String,
    pub url: String,
    /// Already redacted.
    pub request_headers: Option<HeaderSnapshot>,
    /// Parsed, not yet truncated.
    pub request_body: Option<Value>,
}

/// How a call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Response {
        status: u16,
        /// Already redacted.
        headers: HeaderSnapshot,
        /// Parsed, not yet truncated.
        body: Option<Value>,
    },
    Failed {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_finish_success() {
        let policy = CapturePolicy::from_config(&CaptureConfig {
            max_body_length: 4,
            ..CaptureConfig::default()
        });
        let call = CallCapture {
            method: "post".into(),
            url: "https://x/items".into(),
            request_headers: Some(policy.redactor.redact_pairs([("Authorization", "secret")])),
            request_body: Some(json!("abcdefgh")),
        };
        let outcome = CallOutcome::Response {
            status: 201,
            headers: HeaderSnapshot::new(),
            body: Some(json!(1)),
        };

        let fields = policy.finish(call, outcome, Some(Duration::from_millis(12)));
        assert_eq!(fields.method, "POST");
        assert_eq!(fields.status_code, Some(201));
        assert_eq!(fields.duration, Some(12));
        assert_eq!(fields.request_headers.as_ref().unwrap()["authorization"], REDACTION_MARKER);
        assert_eq!(fields.request_body, Some(json!(format!("abcd{}", TRUNCATION_MARKER))));
        assert_eq!(fields.response_body, Some(json!(1)));
        assert_eq!(fields.summary(), "POST 201 https://x/items");
    }

    #[test]
    fn test_finish_failure() {
        let policy = CapturePolicy::default();
        let call = CallCapture {
            method: "GET".into(),
            url: "https://x".into(),
            ..CallCapture::default()
        };
        let fields = policy.finish(call, CallOutcome::Failed { error: String::new() }, None);
        assert_eq!(fields.error.as_deref(), Some(GENERIC_FAILURE));
        assert_eq!(fields.status_code, None);
        assert_eq!(fields.response_headers, None);
    }
}
