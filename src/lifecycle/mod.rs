//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build ResilienceContext → Register checks
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Cancel shutdown token → Server drains and exits
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - One `CancellationToken` is the only shutdown channel

pub mod signals;
pub mod startup;
