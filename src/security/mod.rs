//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → rate_limit.rs (per-key remote quota, fed from response headers)
//!
//! Inbound webhook:
//!     → webhook.rs (HMAC signature, replay window)
//!     → Pass verified payload to the caller
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any verification failure
//! - No trust in inbound input; malformed input is a rejection, not a crash
//! - Constant-time signature comparison

pub mod rate_limit;
pub mod webhook;
