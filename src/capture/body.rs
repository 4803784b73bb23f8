//! Body parsing for logging.
//!
//! Parsing never fails: anything that is not valid structured data degrades
//! to its text form, and non-UTF-8 payloads to a short placeholder.

use serde_json::Value;

/// Parse a request body: structured if it is JSON, raw text otherwise.
pub fn parse_request_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    Some(serde_json::from_slice(bytes).unwrap_or_else(|_| as_text(bytes)))
}

/// Parse a response body according to its declared content type.
///
/// A JSON content type is parsed as JSON (text on failure); any other declared
/// type is kept as text; an undeclared type is sniffed like a request body.
pub fn parse_response_body(content_type: Option<&str>, bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match content_type {
        Some(ct) if is_json(ct) => parse_request_body(bytes),
        Some(_) => Some(as_text(bytes)),
        None => parse_request_body(bytes),
    }
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

fn as_text(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::String(format!("<{} bytes of binary data>", bytes.len())),
    }
}
