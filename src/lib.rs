//! Integration resilience layer.
//!
//! Safe calls to unreliable third-party services (CRMs, messaging providers,
//! payment gateways) and verification of their inbound webhooks.

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod normalize;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::{ResilienceConfig, RetryConfig};
pub use error::{ErrorKind, IntegrationError};
pub use http::HealthServer;
pub use resilience::retries::{ExecuteError, RetryExecutor};
pub use resilience::ResilienceContext;
