//! WebSocket signaling endpoint
//!
//! One socket per connection; each connection is assigned a fresh
//! `ConnectionId` on upgrade and dispatches its inbound envelopes through
//! the shared [`router::EventRouter`]. Outbound traffic flows through an
//! unbounded channel drained by a writer task, so broadcasts from other
//! connections never block a handler. Envelopes on the same connection are
//! handled strictly in order.

pub mod hub;
pub mod protocol;
pub mod router;

use crate::http::AppState;
use crate::observability::metrics;
use crate::ws::protocol::{ClientEnvelope, ServerEnvelope};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use conclave_core::models::ConnectionId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Maximum inbound message size; signaling payloads are small.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// WebSocket handler for the signaling endpoint at `GET /ws`.
///
/// Authentication happens upstream; the participant identity arrives
/// opaque via the join payload.
pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::new();
    metrics::WS_CONNECTIONS_ACTIVE.inc();
    info!(connection_id = %connection_id, "client connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEnvelope>();
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Writer task: serialize outbound envelopes onto the socket.
    let writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match serde_json::to_string(&out) {
                Ok(text) => {
                    if ws_sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!(error = %err, "failed to serialize outbound envelope");
                }
            }
        }
    });

    // Connection greeting so the client learns its connection id.
    let _ = tx.send(ServerEnvelope::event(
        "connected",
        serde_json::json!({ "connectionId": connection_id }),
    ));

    while let Some(message) = ws_stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let envelope: ClientEnvelope = match serde_json::from_str(&text) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        let _ = tx.send(ServerEnvelope::error(
                            "message",
                            None,
                            "ERR_INVALID_INPUT",
                            format!("malformed envelope: {err}"),
                        ));
                        continue;
                    }
                };

                let ctx = router::HandlerContext {
                    connection_id: connection_id.clone(),
                    sender: tx.clone(),
                    state: state.clone(),
                };
                let response = state.event_router.dispatch(ctx, envelope).await;
                let _ = tx.send(response);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                // Ping/pong are answered by axum; binary frames are ignored.
            }
            Err(err) => {
                debug!(connection_id = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Disorderly or orderly, every disconnect runs the same teardown.
    if let Err(err) = router::teardown_connection(&state, &connection_id).await {
        error!(
            connection_id = %connection_id,
            error = %err,
            "teardown after disconnect failed"
        );
    }

    drop(tx);
    let _ = writer.await;

    metrics::WS_CONNECTIONS_ACTIVE.dec();
    info!(connection_id = %connection_id, "client disconnected");
}
