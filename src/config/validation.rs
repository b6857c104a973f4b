//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays > 0, thresholds >= 1, capacities >= 1)
//! - Check that probe URLs and bind addresses parse
//! - Detect duplicate health check names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ResilienceConfig, RetryConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a retry policy on its own (used for per-call overrides too).
pub fn validate_retry(retry: &RetryConfig, prefix: &str, errors: &mut Vec<ValidationError>) {
    if retry.max_attempts < 1 {
        errors.push(ValidationError::new(format!("{prefix}.max_attempts"), "must be at least 1"));
    }
    if retry.initial_delay_ms == 0 {
        errors.push(ValidationError::new(format!("{prefix}.initial_delay_ms"), "must be greater than 0"));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        errors.push(ValidationError::new(
            format!("{prefix}.max_delay_ms"),
            "must be greater than or equal to initial_delay_ms",
        ));
    }
    if !(retry.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new(format!("{prefix}.backoff_multiplier"), "must be at least 1"));
    }
}

/// Validate a full configuration.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_retry(&config.retry, "retry", &mut errors);

    let cb = &config.circuit_breaker;
    if cb.failure_threshold < 1 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if cb.cooldown_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.cooldown_ms", "must be greater than 0"));
    }
    if cb.max_cooldown_ms < cb.cooldown_ms {
        errors.push(ValidationError::new(
            "circuit_breaker.max_cooldown_ms",
            "must be greater than or equal to cooldown_ms",
        ));
    }

    if config.webhook.tolerance_ms == 0 {
        errors.push(ValidationError::new("webhook.tolerance_ms", "must be greater than 0"));
    }

    if config.health.default_timeout_ms == 0 {
        errors.push(ValidationError::new("health.default_timeout_ms", "must be greater than 0"));
    }
    let mut names = HashSet::new();
    for (i, check) in config.health.http_checks.iter().enumerate() {
        if check.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("health.http_checks[{i}].name"), "must not be empty"));
        } else if !names.insert(check.name.as_str()) {
            errors.push(ValidationError::new(
                format!("health.http_checks[{i}].name"),
                format!("duplicate check name '{}'", check.name),
            ));
        }
        match url::Url::parse(&check.url) {
            Ok(url) if url.scheme() == "http" => {}
            Ok(url) => errors.push(ValidationError::new(
                format!("health.http_checks[{i}].url"),
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(format!("health.http_checks[{i}].url"), e.to_string())),
        }
        if check.timeout_ms == Some(0) {
            errors.push(ValidationError::new(
                format!("health.http_checks[{i}].timeout_ms"),
                "must be greater than 0",
            ));
        }
    }

    if config.performance.capacity == 0 {
        errors.push(ValidationError::new("performance.capacity", "must be at least 1"));
    }
    if config.batch.batch_size == 0 {
        errors.push(ValidationError::new("batch.batch_size", "must be at least 1"));
    }

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("server.bind_address", "not a socket address"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
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
    use crate::config::schema::HttpCheckConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ResilienceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ResilienceConfig::default();
        config.retry.max_attempts = 0;
        config.retry.initial_delay_ms = 500;
        config.retry.max_delay_ms = 100;
        config.retry.backoff_multiplier = 0.5;
        config.performance.capacity = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "retry.max_attempts",
                "retry.max_delay_ms",
                "retry.backoff_multiplier",
                "performance.capacity",
            ]
        );
    }

    #[test]
    fn test_rejects_bad_http_checks() {
        let mut config = ResilienceConfig::default();
        config.health.http_checks = vec![
            HttpCheckConfig { name: "crm".into(), url: "http://127.0.0.1:1/ping".into(), timeout_ms: None },
            HttpCheckConfig { name: "crm".into(), url: "not a url".into(), timeout_ms: Some(0) },
            HttpCheckConfig { name: "sms".into(), url: "https://sms.example.com".into(), timeout_ms: None },
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
        assert!(errors.iter().any(|e| e.message.contains("unsupported scheme")));
    }

    #[test]
    fn test_nan_multiplier_is_rejected() {
        let mut config = ResilienceConfig::default();
        config.retry.backoff_multiplier = f64::NAN;
        assert!(validate_config(&config).is_err());
    }
}
