//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the health surface
//! - Wire up middleware (tracing, request timeout)
//! - Serve on a listener until the shutdown token fires

use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::http::handlers::{get_health, get_ready, get_stats};
use crate::resilience::ResilienceContext;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub ctx: ResilienceContext,
}

/// Health surface over a `ResilienceContext`.
pub struct HealthServer {
    router: Router,
}

impl HealthServer {
    pub fn new(ctx: ResilienceContext, config: &ServerConfig) -> Self {
        let router = Self::build_router(config, AppState { ctx });
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(get_health))
            .route("/ready", get(get_ready))
            .route("/stats", get(get_stats))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Health server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}
