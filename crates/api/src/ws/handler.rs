use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde_json::json;

use atelier_core::types::RecordId;
use atelier_studio::SessionView;

use crate::state::AppState;

/// `{"type":"view","data":{...}}` text frame for a snapshot.
pub fn view_message(view: &SessionView) -> Message {
    let body = json!({
        "type": "view",
        "data": view,
    });
    Message::Text(body.to_string().into())
}

/// GET /api/v1/sessions/{id}/ws
///
/// Upgrades to a WebSocket that pushes every republished view snapshot of
/// the session. The connection holds a registry lease for its lifetime.
pub async fn session_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<RecordId>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Manage a single WebSocket connection after upgrade.
///
///   1. Takes a lease on the session (loading it if needed).
///   2. Registers the connection with `WsManager`.
///   3. Spawns a sender task that forwards the manager channel to the sink.
///   4. Spawns a view task that queues every snapshot on that channel.
///   5. Processes inbound frames until the client goes away.
async fn handle_socket(socket: WebSocket, state: AppState, session_id: RecordId) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, session_id = %session_id, "WebSocket connected");

    let lease = state.sessions.acquire(&session_id).await;
    let mut rx = state
        .ws_manager
        .add(conn_id.clone(), session_id.clone())
        .await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    let mut views = lease.view_model().subscribe();
    let view_manager = state.ws_manager.clone();
    let view_conn_id = conn_id.clone();
    let view_task = tokio::spawn(async move {
        loop {
            let message = view_message(&views.borrow_and_update());
            if !view_manager.send_to(&view_conn_id, message).await {
                break;
            }
            if views.changed().await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_msg) => {
                // The view is driven over HTTP; inbound frames are ignored.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.ws_manager.remove(&conn_id).await;
    view_task.abort();
    send_task.abort();
    drop(lease);
    tracing::info!(conn_id = %conn_id, session_id = %session_id, "WebSocket disconnected");
}
