//! Data and response normalization.
//!
//! # Data Flow
//! ```text
//! Outbound:
//!     validation.rs (JSON Schema check, typed mapping)
//!     → batch.rs (ordered chunks, per-item outcomes, enrichment)
//!
//! Inbound:
//!     RawResponse → response.rs (envelope + pagination)
//! ```
//!
//! # Design Decisions
//! - Pure functions; only the batch helpers await caller-supplied work
//! - Partial success is a normal outcome, never a whole-call failure

pub mod batch;
pub mod response;
pub mod validation;

pub use batch::{batch_process, batch_process_limited, enrich_data, EnrichmentFailure, EnrichmentOutcome};
pub use response::{extract_pagination, process_response, Pagination, RawResponse, ResponseEnvelope};
pub use validation::{map_data, validate_and_map, validate_data, SchemaViolation};
