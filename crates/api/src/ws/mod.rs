//! WebSocket infrastructure for live session views.
//!
//! Provides connection management, heartbeat monitoring, and the HTTP
//! upgrade handler used by the session routes.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::{session_ws_handler, view_message};
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
