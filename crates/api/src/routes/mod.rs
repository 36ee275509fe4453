pub mod health;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /sessions/{id}                                   view snapshot (GET)
/// /sessions/{id}/ws                                live view WebSocket
/// /sessions/{id}/refresh                           reload (POST)
/// /sessions/{id}/retry                             retry a failed load (POST)
/// /sessions/{id}/regenerate                        queue new variations (POST)
/// /sessions/{id}/variations/{variation_id}/upscale queue an upscale (POST)
/// /sessions/{id}/select                            select a variation (POST)
/// /sessions/{id}/proceed                           product selection path (GET)
/// /sessions/{id}/notifications/{notification_id}   dismiss (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/sessions", sessions::router())
}
