use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::health::HealthReport;
use crate::http::server::AppState;
use crate::observability::performance::OperationStats;

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub version: &'static str,
    pub status: &'static str,
}

/// Liveness: the process is up. Never touches dependencies.
pub async fn get_health() -> Json<Liveness> {
    Json(Liveness {
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
    })
}

/// Readiness: run every registered check; 503 only when one is Unhealthy.
pub async fn get_ready(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::from_results(state.ctx.health().run_all_checks().await);

    let status = if report.is_ready() {
        StatusCode::OK
    } else {
        tracing::warn!(unhealthy = report.unhealthy, "Readiness check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn get_stats(State(state): State<AppState>) -> Json<BTreeMap<String, OperationStats>> {
    let performance = state.ctx.performance();
    let stats = performance
        .operations()
        .into_iter()
        .filter_map(|op| performance.stats(&op).map(|s| (op, s)))
        .collect();
    Json(stats)
}
