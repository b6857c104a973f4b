//! `resilience-health`: health surface for an integration resilience layer.
//!
//! # Architecture Overview
//!
//! ```text
//!     GET /health ─┐
//!     GET /ready  ─┼─▶ http::server ─▶ ResilienceContext ─┬─▶ HealthRegistry ─▶ HttpProbe ─▶ dependency
//!     GET /stats  ─┘                                      ├─▶ PerformanceRecorder
//!                                                         ├─▶ CircuitBreakerRegistry
//!                                                         └─▶ RateLimitTracker
//! ```
//!
//! `--check` runs every dependency check once, prints the report as JSON and
//! exits non-zero when any check is Unhealthy.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use integration_resilience::lifecycle::{signals, startup};
use integration_resilience::observability::{logging, metrics};
use integration_resilience::health::HealthReport;
use integration_resilience::HealthServer;

#[derive(Parser)]
#[command(name = "resilience-health")]
#[command(about = "Health and readiness endpoints for third-party integrations", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run all checks once, print the report and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match startup::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("resilience-health: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init(&config.observability) {
        eprintln!("resilience-health: failed to initialize logging: {}", e);
    }

    tracing::info!(
        bind_address = %config.server.bind_address,
        checks = config.health.http_checks.len(),
        "resilience-health v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server_config = config.server.clone();
    let ctx = startup::build_context(config);

    if cli.check {
        let report = HealthReport::from_results(ctx.health().run_all_checks().await);
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::error!(error = %e, "Failed to render health report"),
        }
        return if report.is_ready() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let listener = match TcpListener::bind(&server_config.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %server_config.bind_address, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    signals::cancel_on_signal(shutdown.clone());

    let server = HealthServer::new(ctx, &server_config);
    if let Err(e) = server.run(listener, shutdown).await {
        tracing::error!(error = %e, "Health server failed");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
