//! Route definitions for the `/sessions` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/sessions`.
///
/// ```text
/// GET    /{id}                                         -> get_view
/// GET    /{id}/ws                                      -> session_ws_handler
/// POST   /{id}/refresh                                 -> refresh
/// POST   /{id}/retry                                   -> retry
/// POST   /{id}/regenerate                              -> regenerate
/// POST   /{id}/variations/{variation_id}/upscale       -> upscale
/// POST   /{id}/select                                  -> select
/// GET    /{id}/proceed                                 -> proceed
/// DELETE /{id}/notifications/{notification_id}         -> dismiss_notification
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(sessions::get_view))
        .route("/{id}/ws", get(ws::session_ws_handler))
        .route("/{id}/refresh", post(sessions::refresh))
        .route("/{id}/retry", post(sessions::retry))
        .route("/{id}/regenerate", post(sessions::regenerate))
        .route(
            "/{id}/variations/{variation_id}/upscale",
            post(sessions::upscale),
        )
        .route("/{id}/select", post(sessions::select))
        .route("/{id}/proceed", get(sessions::proceed))
        .route(
            "/{id}/notifications/{notification_id}",
            delete(sessions::dismiss_notification),
        )
}
