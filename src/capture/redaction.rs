//! Header redaction.
//!
//! Sensitive header values are replaced with [`REDACTION_MARKER`] before a
//! header snapshot ever reaches an event. Matching is case-insensitive.

use std::collections::HashSet;

use axum::http::HeaderMap;

use crate::store::HeaderSnapshot;

/// Replacement value for redacted headers.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Header names always treated as sensitive.
pub const DEFAULT_SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "x-access-token",
    "x-csrf-token",
    "x-session-id",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRedactor {
    sensitive: HashSet<String>,
}

impl HeaderRedactor {
    /// Build a redactor from the default set plus `extra` names.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sensitive = DEFAULT_SENSITIVE_HEADERS
            .iter()
            .map(|h| h.to_string())
            .chain(
                extra
                    .into_iter()
                    .map(|h| h.as_ref().trim().to_ascii_lowercase())
                    .filter(|h| !h.is_empty()),
            )
            .collect();
        Self { sensitive }
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.contains(&name.to_ascii_lowercase())
    }

    /// Snapshot of `(name, value)` pairs. Repeated names are joined with `", "`.
    pub fn redact_pairs<'a, I>(&self, headers: I) -> HeaderSnapshot
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut snapshot = HeaderSnapshot::new();
        for (name, value) in headers {
            let key = name.to_ascii_lowercase();
            let value = if self.is_sensitive(&key) {
                REDACTION_MARKER
            } else {
                value
            };
            snapshot
                .entry(key)
                .and_modify(|existing: &mut String| {
                    if existing != REDACTION_MARKER {
                        existing.push_str(", ");
                        existing.push_str(value);
                    }
                })
                .or_insert_with(|| value.to_string());
        }
        snapshot
    }

    /// Snapshot of an `http::HeaderMap`. Non-UTF-8 values are rendered lossily.
    pub fn redact_map(&self, headers: &HeaderMap) -> HeaderSnapshot {
        let owned: Vec<(&str, String)> = headers
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        self.redact_pairs(owned.iter().map(|(n, v)| (*n, v.as_str())))
    }
}

impl Default for HeaderRedactor {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}
