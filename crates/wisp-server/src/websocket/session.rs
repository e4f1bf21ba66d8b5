//! WebSocket session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use wisp_core::events::{ClientEvent, ServerEvent};
use wisp_core::ids::{ConnectionId, RoomId};

use crate::server::AppState;

use super::connection::ClientConnection;

/// Interval between server-initiated Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong before considering the client dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound queue depth per connection; overflow drops the message.
const SEND_QUEUE_DEPTH: usize = 256;

/// Query parameters accepted by `GET /ws`.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Requested room; omitted to let the server pick.
    #[serde(rename = "roomId")]
    pub room_id: Option<RoomId>,
}

/// Upgrade handler for `GET /ws`.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.broadcast.connection_count() >= state.config.max_connections {
        warn!(limit = state.config.max_connections, "connection limit reached, refusing upgrade");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| run_ws_session(socket, state, query.room_id))
}

/// Run a WebSocket session for a connected client.
///
/// 1. Resolves a room and registers the session
/// 2. Sends a `room-assigned` greeting with the entity snapshot
/// 3. Dispatches incoming frames as client events
/// 4. Forwards outbound events and periodic Ping frames
/// 5. Cleans up world state on disconnect
async fn run_ws_session(socket: WebSocket, state: AppState, requested: Option<RoomId>) {
    let (room, existed, session_id) = state.gateway.connect(requested);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(SEND_QUEUE_DEPTH);
    let connection = Arc::new(ClientConnection::new(
        ConnectionId::generate(),
        room.id.clone(),
        session_id,
        send_tx,
    ));
    info!(connection_id = %connection.id, room_id = %room.id, existed, "client connected");
    state.broadcast.add(Arc::clone(&connection));

    // Greet before the forwarder starts draining the queue, so this is
    // always the first frame the client sees.
    let assigned = ServerEvent::RoomAssigned {
        room_id: room.id.clone(),
        is_origin: room.is_origin,
        existed,
        entity: state.gateway.entity_snapshot(),
    };
    if let Ok(json) = serde_json::to_string(&assigned) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with periodic Ping frames.
    let outbound_conn = Arc::clone(&connection);
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > PONG_TIMEOUT
                    {
                        warn!(connection_id = %outbound_conn.id, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Process incoming frames. Some clients send text as binary.
    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_owned()),
                Err(_) => {
                    debug!(connection_id = %connection.id, len = data.len(), "non-utf8 binary frame ignored");
                    None
                }
            },
            Message::Close(_) => {
                info!(connection_id = %connection.id, "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };

        let Some(text) = text else { continue };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => state.gateway.handle_event(&connection, event),
            Err(e) => {
                debug!(connection_id = %connection.id, error = %e, "unparseable client event ignored");
            }
        }
    }

    info!(connection_id = %connection.id, "client disconnected");
    outbound.abort();
    let _ = state.broadcast.remove(&connection.id);
    state.gateway.disconnect(&connection);
}
