//! Operator endpoints (spec.md §6: `GET /health`, `/health/ready`,
//! `/health/live`, `/health/stats`).

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use crate::metrics::Metrics;

/// `GET /health`: unconditional liveness/readiness combined, matching the
/// teacher's unprotected health route.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/live`: process is up and serving.
pub async fn live() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/ready`: identical to `live` here — the gateway holds no
/// credentials and opens no persistent upstream connections to warm up.
pub async fn ready() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/stats`: runtime counters (SPEC_FULL §14).
pub async fn stats(State(metrics): State<Arc<Metrics>>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(metrics.snapshot())
}
