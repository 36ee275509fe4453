//! WebSocket client for the Supabase Realtime endpoint.
//!
//! [`RealtimeClient`] only knows how to open a socket. Channel joins,
//! heartbeats and routing live in [`crate::manager`].

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::RealtimeConfig;

pub type RealtimeStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct RealtimeClient {
    ws_url: String,
}

/// A freshly opened Realtime socket.
pub struct RealtimeConnection {
    pub ws_stream: RealtimeStream,
}

impl RealtimeClient {
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            ws_url: config.ws_url(),
        }
    }

    /// Endpoint without the `apikey` query, safe to log.
    pub fn endpoint(&self) -> &str {
        self.ws_url.split('?').next().unwrap_or(&self.ws_url)
    }

    pub async fn connect(&self) -> Result<RealtimeConnection, RealtimeClientError> {
        let (ws_stream, _response) = connect_async(self.ws_url.as_str()).await.map_err(|e| {
            RealtimeClientError::Connection(format!(
                "Failed to connect to Realtime at {}: {e}",
                self.endpoint()
            ))
        })?;

        tracing::info!(endpoint = %self.endpoint(), "Connected to Supabase Realtime");

        Ok(RealtimeConnection { ws_stream })
    }
}

/// Errors that can occur on the Realtime socket.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server stopped answering or sent something we cannot continue from.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
