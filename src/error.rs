//! Integration error taxonomy.
//!
//! # Responsibilities
//! - Classify every failure of a third-party call into exactly one kind
//! - Carry a machine-readable `code` and `metadata` to the caller layer
//! - Decide the default retryability of each kind
//!
//! # Design Decisions
//! - One record with a closed `ErrorKind` tag instead of an error hierarchy
//! - Only connection and rate-limit failures (and 5xx) are retryable by default
//! - Webhook and data-mapping failures are never retried

use std::fmt;
use std::time::Duration;

use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::security::rate_limit::RateLimitInfo;

/// Free-form metadata attached to an error.
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key set on errors produced by an open circuit.
pub const REASON_KEY: &str = "reason";
/// Reason value for circuit-open short-circuits.
pub const CIRCUIT_OPEN: &str = "circuit_open";

/// The variant tag of an [`IntegrationError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient network or timeout failure.
    Connection,
    /// The remote throttled us.
    RateLimit {
        /// Seconds to wait before the next call, when known.
        retry_after_secs: Option<u64>,
        /// Quota of the current window, when known.
        limit: Option<u64>,
    },
    /// An inbound webhook failed verification.
    Webhook {
        signature: Option<String>,
        timestamp: Option<String>,
    },
    /// Data could not be mapped onto the target schema.
    DataMapping {
        source_data: Value,
        target_schema: String,
    },
    /// Anything else (HTTP status failures, unexpected responses).
    Generic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::RateLimit { .. } => "rate_limit",
            ErrorKind::Webhook { .. } => "webhook",
            ErrorKind::DataMapping { .. } => "data_mapping",
            ErrorKind::Generic => "integration",
        };
        f.write_str(name)
    }
}

/// A classified failure of an integration call.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind} error [{code}]: {message}")]
pub struct IntegrationError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub status_code: Option<u16>,
    pub is_retryable: bool,
    pub metadata: Metadata,
}

impl IntegrationError {
    fn build(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            status_code: None,
            is_retryable: retryable,
            metadata: Metadata::new(),
        }
    }

    /// Transient network failure. Always retryable.
    pub fn connection(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ErrorKind::Connection, code, message, true)
    }

    /// Remote throttling. Retryable once `retry_after_secs` has elapsed.
    pub fn rate_limit(message: impl Into<String>, retry_after_secs: Option<u64>, limit: Option<u64>) -> Self {
        Self::build(
            ErrorKind::RateLimit { retry_after_secs, limit },
            "rate_limited",
            message,
            true,
        )
        .with_status(429)
    }

    /// Webhook verification failure. Never retried.
    pub fn webhook(
        code: impl Into<String>,
        message: impl Into<String>,
        signature: Option<String>,
        timestamp: Option<String>,
    ) -> Self {
        Self::build(ErrorKind::Webhook { signature, timestamp }, code, message, false)
    }

    /// Mapping failure. Never retried.
    pub fn data_mapping(message: impl Into<String>, source_data: Value, target_schema: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::DataMapping {
                source_data,
                target_schema: target_schema.into(),
            },
            "data_mapping_failed",
            message,
            false,
        )
    }

    /// Unclassified failure with explicit retryability.
    pub fn generic(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::build(ErrorKind::Generic, code, message, retryable)
    }

    /// Short-circuit raised while the breaker for `context` is open.
    pub fn circuit_open(context: &str, retry_after: Duration) -> Self {
        Self::connection("circuit_open", format!("circuit for '{}' is open", context))
            .with_metadata(REASON_KEY, CIRCUIT_OPEN)
            .with_metadata("context", context)
            .with_metadata("retry_after_ms", retry_after.as_millis() as u64)
    }

    /// Classify an HTTP status that the caller did not expect.
    pub fn from_status(status: u16, body: &str, headers: &HeaderMap) -> Self {
        let message = if body.is_empty() {
            format!("unexpected status {}", status)
        } else {
            format!("unexpected status {}: {}", status, truncate(body, 256))
        };

        match status {
            408 => Self::connection("request_timeout", message).with_status(status),
            429 => {
                let info = RateLimitInfo::from_headers(headers);
                let retry_after = headers
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok());
                Self::rate_limit(message, retry_after, info.and_then(|i| i.limit))
            }
            500..=599 => Self::generic("server_error", message, true).with_status(status),
            _ => Self::generic("client_error", message, false).with_status(status),
        }
    }

    /// Attach an HTTP status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Server-requested wait before retrying, for rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match &self.kind {
            ErrorKind::RateLimit { retry_after_secs: Some(secs), .. } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// True for errors produced by an open circuit rather than the remote.
    pub fn is_circuit_open(&self) -> bool {
        self.metadata.get(REASON_KEY).and_then(Value::as_str) == Some(CIRCUIT_OPEN)
    }
}

impl From<std::io::Error> for IntegrationError {
    fn from(err: std::io::Error) -> Self {
        Self::connection("io_error", err.to_string()).with_metadata("io_kind", format!("{:?}", err.kind()))
    }
}

impl From<tokio::time::error::Elapsed> for IntegrationError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::connection("timeout", "operation timed out")
    }
}

impl From<serde_json::Error> for IntegrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::data_mapping(err.to_string(), Value::Null, "json")
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
