//! HTTP health surface.
//!
//! # Data Flow
//! ```text
//! GET /health → handlers.rs (liveness, no dependency calls)
//! GET /ready  → handlers.rs → HealthRegistry::run_all_checks
//! GET /stats  → handlers.rs → PerformanceRecorder::stats
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HealthServer};
