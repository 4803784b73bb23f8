//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity > 0, body bounds consistent)
//! - Validate addresses and header names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: InspectorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::InspectorConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("store.max_capacity must be greater than 0")]
    ZeroCapacity,

    #[error("capture.max_body_length must be greater than 0")]
    ZeroBodyLength,

    #[error("capture.max_buffer_bytes ({buffer}) must be at least capture.max_body_length ({body})")]
    BufferSmallerThanBody { buffer: usize, body: usize },

    #[error("capture.sensitive_headers contains an invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("failure_hook.ignore_patterns contains an empty pattern")]
    EmptyIgnorePattern,

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &InspectorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.store.max_capacity == 0 {
        errors.push(ValidationError::ZeroCapacity);
    }

    if config.capture.max_body_length == 0 {
        errors.push(ValidationError::ZeroBodyLength);
    }

    if config.capture.max_buffer_bytes < config.capture.max_body_length {
        errors.push(ValidationError::BufferSmallerThanBody {
            buffer: config.capture.max_buffer_bytes,
            body: config.capture.max_body_length,
        });
    }

    for name in &config.capture.sensitive_headers {
        if axum::http::HeaderName::from_bytes(name.trim().as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName(name.clone()));
        }
    }

    if config.failure_hook.ignore_patterns.iter().any(|p| p.is_empty()) {
        errors.push(ValidationError::EmptyIgnorePattern);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&InspectorConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = InspectorConfig::default();
        config.store.max_capacity = 0;
        config.capture.max_body_length = 0;
        config.capture.sensitive_headers = vec!["bad header".into()];
        config.failure_hook.ignore_patterns.push(String::new());
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::ZeroCapacity));
        assert!(errors.contains(&ValidationError::InvalidHeaderName("bad header".into())));
    }

    #[test]
    fn test_buffer_bound() {
        let mut config = InspectorConfig::default();
        config.capture.max_buffer_bytes = 10;
        config.capture.max_body_length = 100;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::BufferSmallerThanBody { buffer: 10, body: 100 }]
        );
    }
}
