use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use snapgate_realtime::{
    protocol, ClientMessage, ConnectionId, MessageKind, Transport, TransportError,
};
use tracing::{debug, info, warn};

use crate::auth;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /ws/{session_id}
///
/// Upgrade to a WebSocket for a session. A valid `token` query parameter
/// identifies the session owner and registers the connection for delivery;
/// without one the socket is accepted but receives no notifications.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if uuid::Uuid::parse_str(&session_id).is_err() {
        return (StatusCode::BAD_REQUEST, "invalid session id").into_response();
    }

    let owner = query.token.as_deref().and_then(|token| {
        auth::verify_token(
            &state.config.auth.secret,
            token,
            state.config.auth.token_max_age_secs,
        )
    });

    ws.on_upgrade(move |socket| handle_socket(state, socket, session_id, owner))
}

/// A live WebSocket behind the realtime [`Transport`] trait. The sink side
/// is mutex-wrapped so the dispatcher and the receive loop can both write.
struct WsTransport {
    sink: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
        .map_err(|e| TransportError::Io(e.to_string()))
    }
}

async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    session_id: String,
    owner: Option<String>,
) {
    let (sink, stream) = socket.split();
    let transport = Arc::new(WsTransport {
        sink: tokio::sync::Mutex::new(sink),
    });

    let id = state
        .realtime
        .registry
        .connect(transport.clone(), &session_id, owner.as_deref());
    state.metrics.ws_connections_total.inc();
    info!(%session_id, conn = %id, owner = owner.is_some(), "websocket connected");

    let greeting_kind = if owner.is_some() {
        MessageKind::OwnerConnected
    } else {
        MessageKind::Connected
    };
    let greeting = protocol::greeting(greeting_kind, &session_id).to_string();
    if let Err(e) = transport.send_text(greeting).await {
        warn!(conn = %id, error = %e, "failed to send greeting");
        state.realtime.registry.disconnect(id);
        return;
    }

    receive_loop(&state, transport.as_ref(), stream, id).await;

    state.realtime.registry.disconnect(id);
    debug!(conn = %id, "websocket closed");
}

/// Pump inbound frames until the peer goes away. Every inbound frame counts
/// as a liveness signal.
async fn receive_loop(
    state: &SharedState,
    transport: &WsTransport,
    mut stream: SplitStream<WebSocket>,
    id: ConnectionId,
) {
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(conn = %id, error = %e, "websocket receive error");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                state.realtime.liveness.heartbeat(id);
                let reply = match protocol::parse_client_message(text.as_str()) {
                    ClientMessage::Ping => Some(protocol::pong()),
                    ClientMessage::Ack { sequence } => {
                        debug!(conn = %id, ?sequence, "client acknowledged message");
                        None
                    }
                    ClientMessage::Other(raw) => Some(protocol::echo_reply(&raw)),
                };
                if let Some(reply) = reply {
                    if transport.send_text(reply.to_string()).await.is_err() {
                        break;
                    }
                }
            }
            Message::Ping(_) | Message::Pong(_) => {
                state.realtime.liveness.heartbeat(id);
            }
            Message::Close(_) => break,
            Message::Binary(_) => {
                // Binary frames are not part of the protocol; ignored.
                state.realtime.liveness.heartbeat(id);
            }
        }
    }
}
