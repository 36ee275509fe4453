use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether PostgREST is reachable and accepts our key.
    pub db_healthy: bool,
    /// Whether views receive realtime changes.
    pub realtime_enabled: bool,
    /// Number of cached session views.
    pub open_sessions: usize,
}

/// GET /health -- returns service and PostgREST health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = match atelier_db::health_check(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "PostgREST health check failed");
            false
        }
    };

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        realtime_enabled: state.sessions.context().realtime_enabled(),
        open_sessions: state.sessions.len(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
