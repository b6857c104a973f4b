//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (registry.rs):
//!     name → probe (closure or HealthProbe impl) + timeout
//!
//! run_all_checks():
//!     All probes concurrently, each under its own deadline
//!     → Timed-out probe recorded as Unhealthy("timeout")
//!     → Panicking probe recorded as Unhealthy("panicked: ...")
//!     → Results stored for is_healthy / has_no_unhealthy / report
//!
//! Built-in probes (probes.rs):
//!     HttpProbe: GET url → Healthy / Degraded (slow) / Unhealthy
//! ```
//!
//! # Design Decisions
//! - A probe never hangs the aggregate; every probe has a deadline
//! - `is_healthy` (all Healthy) and `has_no_unhealthy` (readiness) are
//!   deliberately different predicates

pub mod probes;
pub mod registry;

use serde::Serialize;

use crate::error::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self::with_status(HealthStatus::Healthy)
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::with_status(HealthStatus::Degraded)
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(HealthStatus::Unhealthy)
        }
    }

    fn with_status(status: HealthStatus) -> Self {
        Self {
            status,
            response_time_ms: 0,
            error: None,
            metadata: None,
        }
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }
}

pub use probes::HttpProbe;
pub use registry::{HealthProbe, HealthRegistry, HealthReport};
