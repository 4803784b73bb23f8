//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the inspector.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::capture::truncation::DEFAULT_MAX_BODY_LENGTH;
use crate::failure::hook::DEFAULT_IGNORE_PATTERNS;
use crate::store::DEFAULT_MAX_CAPACITY;

/// Root configuration for the inspector.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct InspectorConfig {
    /// Event retention and enablement.
    pub store: StoreConfig,

    /// Redaction and truncation applied to captured calls.
    pub capture: CaptureConfig,

    /// Uncaught failure hook settings.
    pub failure_hook: FailureHookConfig,

    /// Logging and metrics of the inspector itself.
    pub observability: ObservabilityConfig,
}

/// Event store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Whether events are captured at all. On in debug builds by default.
    pub enabled: bool,

    /// Maximum number of retained events (oldest evicted first).
    pub max_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(debug_assertions),
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

/// Capture policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Additional header names to redact, merged with the built-in set.
    pub sensitive_headers: Vec<String>,

    /// Maximum serialized body length kept in an event.
    pub max_body_length: usize,

    /// Maximum bytes the middleware buffers per body.
    pub max_buffer_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sensitive_headers: Vec::new(),
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
            max_buffer_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Failure hook configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FailureHookConfig {
    /// Install the process panic hook at startup.
    pub enabled: bool,

    /// Delay before the hook replaces the current handler, in milliseconds.
    pub install_delay_ms: u64,

    /// Failures whose message contains any of these are dropped.
    pub ignore_patterns: Vec<String>,
}

impl Default for FailureHookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            install_delay_ms: 100,
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
