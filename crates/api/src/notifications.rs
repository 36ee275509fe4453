//! Forwards studio events to the WebSocket clients of the session they
//! belong to.

use std::sync::Arc;

use atelier_events::StudioEvent;
use axum::extract::ws::Message;
use serde_json::json;
use tokio::sync::broadcast;

use crate::ws::WsManager;

pub struct EventForwarder {
    ws_manager: Arc<WsManager>,
}

impl EventForwarder {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run until the [`EventBus`](atelier_events::EventBus) is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<StudioEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let delivered = self.forward(&event).await;
                    tracing::trace!(
                        event_type = %event.event_type,
                        session_id = %event.session_id,
                        delivered,
                        "Studio event forwarded",
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event forwarder shutting down");
                    break;
                }
            }
        }
    }

    /// Send one event as `{"type":"event","data":{...}}`. Returns the
    /// number of connections reached.
    pub async fn forward(&self, event: &StudioEvent) -> usize {
        let body = json!({
            "type": "event",
            "data": event,
        });
        self.ws_manager
            .send_to_session(&event.session_id, Message::Text(body.to_string().into()))
            .await
    }
}
