//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Build the `ResilienceContext` and register configured dependency checks
//!
//! # Design Decisions
//! - Fail fast: any configuration error is fatal
//! - Subsystems initialize in order, not concurrently

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, ConfigError, ResilienceConfig};
use crate::health::HttpProbe;
use crate::resilience::ResilienceContext;

/// Load `path` when given, else start from validated defaults.
pub fn load(path: Option<&Path>) -> Result<ResilienceConfig, ConfigError> {
    match path {
        Some(path) => {
            let config = config::load_config(path)?;
            tracing::info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => {
            let config = ResilienceConfig::default();
            config::validate_config(&config).map_err(ConfigError::Validation)?;
            tracing::info!("No configuration file given, using defaults");
            Ok(config)
        }
    }
}

/// Build the context and register one `HttpProbe` per `health.http_checks` entry.
pub fn build_context(config: ResilienceConfig) -> ResilienceContext {
    let ctx = ResilienceContext::new(config);
    let health = &ctx.config().health;
    let degraded_after = Duration::from_millis(health.degraded_threshold_ms);

    for check in &health.http_checks {
        let timeout = Duration::from_millis(check.timeout_ms.unwrap_or(health.default_timeout_ms));
        ctx.health().register_probe(
            check.name.clone(),
            Arc::new(HttpProbe::new(check.url.clone(), degraded_after)),
            timeout,
        );
        tracing::info!(check = %check.name, url = %check.url, "Dependency check registered");
    }

    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpCheckConfig;

    #[test]
    fn test_defaults_without_path() {
        let config = load(None).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load(Some(Path::new("/nonexistent/resilience.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[tokio::test]
    async fn test_http_checks_are_registered() {
        let mut config = ResilienceConfig::default();
        config.health.http_checks = vec![
            HttpCheckConfig { name: "crm".into(), url: "http://127.0.0.1:1/health".into(), timeout_ms: Some(50) },
            HttpCheckConfig { name: "sms".into(), url: "http://127.0.0.1:1/ping".into(), timeout_ms: None },
        ];

        let ctx = build_context(config);
        let results = ctx.health().run_all_checks().await;
        let names: Vec<&str> = results.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["crm", "sms"]);
    }
}
