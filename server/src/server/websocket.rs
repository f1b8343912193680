//! WebSocket transport for overlay packet delivery

use crate::protocol::ProtocolAdapter;
use crate::server::registry::{ConnectionRegistry, OUTBOUND_BUFFER};
use crate::session::VisualizerHandle;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionRegistry>,
    pub adapter: Arc<dyn ProtocolAdapter>,
    pub visualizer: VisualizerHandle,
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!("new client connection: {}", connection_id);

    // Register the outbound buffer and install the click interceptor
    let (tx, mut rx) = tokio::sync::mpsc::channel(OUTBOUND_BUFFER);
    let connection = state.connections.register(connection_id, tx);
    state.adapter.attach(&connection);

    use futures_util::{SinkExt, StreamExt};
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Forward queued wire packets to the socket
    let send_task = tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            if ws_sender.send(Message::Binary(packet.to_vec())).await.is_err() {
                break;
            }
        }
    });

    // Inbound loop: binary frames run through the interceptor first;
    // everything it does not claim passes through untouched
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Binary(data)) => {
                if !connection.intercept(&data) {
                    trace!("pass-through frame from {} ({} bytes)", connection_id, data.len());
                }
            }
            Ok(Message::Text(text)) => {
                debug!("ignoring text frame from {}: {} bytes", connection_id, text.len());
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // axum answers pings; nothing to track here
            }
            Ok(Message::Close(_)) => {
                info!("client {} requested close", connection_id);
                break;
            }
            Err(e) => {
                error!("websocket error for {}: {}", connection_id, e);
                break;
            }
        }
    }

    // Cleanup
    send_task.abort();
    state.connections.remove(connection_id);
    info!("client connection closed: {}", connection_id);
}
