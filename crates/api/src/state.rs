use std::sync::Arc;

use crate::config::ServerConfig;
use crate::registry::SessionRegistry;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// PostgREST client, used directly only by the health check.
    pub db: atelier_db::PostgrestClient,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Open session view models.
    pub sessions: Arc<SessionRegistry>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Centralized event bus the view models publish to.
    pub event_bus: Arc<atelier_events::EventBus>,
}
