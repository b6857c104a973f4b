//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → ResilienceContext::new builds every component from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BatchConfig, CircuitBreakerConfig, HealthConfig, HttpCheckConfig, LogFormat,
    ObservabilityConfig, PerformanceConfig, ResilienceConfig, RetryConfig, ServerConfig,
    SignatureScheme, WebhookConfig,
};
pub use validation::{validate_config, ValidationError};
