//! Body truncation.

use serde_json::Value;

/// Default maximum serialized body length, in characters.
pub const DEFAULT_MAX_BODY_LENGTH: usize = 10_000;

/// Appended to a body cut at the length bound.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyTruncator {
    max_length: usize,
}

impl BodyTruncator {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Bound a body.
    ///
    /// Strings are measured as-is, other values by their compact JSON form.
    /// A body within the bound is returned untouched, structure included.
    pub fn truncate(&self, body: Value) -> Value {
        let text = match &body {
            Value::String(s) => {
                if s.chars().count() <= self.max_length {
                    return body;
                }
                s.clone()
            }
            other => match serde_json::to_string(other) {
                Ok(serialized) if serialized.chars().count() > self.max_length => serialized,
                _ => return body,
            },
        };

        let mut prefix: String = text.chars().take(self.max_length).collect();
        prefix.push_str(TRUNCATION_MARKER);
        Value::String(prefix)
    }
}

impl Default for BodyTruncator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_LENGTH)
    }
}
