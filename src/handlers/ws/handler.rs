//! Axum WebSocket handler
//!
//! One connection is one session. The socket is split: a writer task drains
//! the session's output channel into text frames, and the read loop decodes
//! inbound frames and forwards them to the session actor.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::audio;
use crate::core::session::{SessionHandle, SessionOutput};
use crate::state::AppState;

use super::error::{WebSocketError, WebSocketResult};
use super::messages::{IncomingMessage, OutgoingMessage};

/// Channel buffer size for session outputs
/// Audio chunks dominate the traffic; a larger buffer keeps the actor from
/// stalling on a slow socket write
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// WebSocket voice conversation handler
/// Upgrades the HTTP connection to WebSocket and starts a session
pub async fn ws_voice_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("WebSocket voice connection upgrade requested");
    ws.on_upgrade(move |socket| handle_voice_socket(socket, state))
}

/// Handle one WebSocket voice connection for its whole lifetime
async fn handle_voice_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let _active = app_state.register_session();

    let (mut sender, mut receiver) = socket.split();
    let (output_tx, mut output_rx) = mpsc::channel::<SessionOutput>(CHANNEL_BUFFER_SIZE);

    let (session, session_task) = SessionHandle::spawn(
        app_state.session_config(),
        app_state.coordinator.clone(),
        (app_state.vad_factory)(),
        output_tx,
    );
    let session_id = session.id().to_string();
    info!("WebSocket voice connection established, session {}", session_id);

    // Writer task: session outputs to JSON text frames, in order
    let writer_session = session_id.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(output) = output_rx.recv().await {
            let message = OutgoingMessage::from(output);
            let json_str = match serde_json::to_string(&message) {
                Ok(json_str) => json_str,
                Err(e) => {
                    error!("[{}] Failed to serialize outgoing message: {}", writer_session, e);
                    continue;
                }
            };

            if let Err(e) = sender.send(Message::Text(json_str.into())).await {
                debug!("[{}] Failed to send WebSocket message: {}", writer_session, e);
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(msg_result) = receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(e) => {
                warn!("[{}] WebSocket error: {}", session_id, e);
                break;
            }
        };

        match process_message(msg, &session).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(WebSocketError::SessionClosed) => {
                error!("[{}] Session actor stopped unexpectedly", session_id);
                break;
            }
            Err(e) => warn!("[{}] Dropping message: {}", session_id, e),
        }
    }

    // Actor cancels any run on shutdown and drops the output sender, which
    // lets the writer finish flushing
    session.shutdown().await;
    drop(session);
    if let Err(e) = session_task.await {
        error!("[{}] Session task failed: {}", session_id, e);
    }
    if let Err(e) = sender_task.await {
        debug!("[{}] Writer task ended abnormally: {}", session_id, e);
    }

    info!("WebSocket voice connection terminated, session {}", session_id);
}

/// Process one inbound WebSocket message. Returns `false` when the client
/// closed the connection.
async fn process_message(msg: Message, session: &SessionHandle) -> WebSocketResult<bool> {
    match msg {
        Message::Text(text) => {
            let incoming: IncomingMessage = serde_json::from_str(&text)?;
            debug!("[{}] Received {:?}", session.id(), incoming);
            session
                .send_command(incoming.into())
                .await
                .map_err(|_| WebSocketError::SessionClosed)?;
            Ok(true)
        }
        Message::Binary(data) => {
            let frame = audio::decode(&data)?;
            session
                .send_frame(frame)
                .await
                .map_err(|_| WebSocketError::SessionClosed)?;
            Ok(true)
        }
        // Ping/Pong is handled automatically by axum
        Message::Ping(_) | Message::Pong(_) => Ok(true),
        Message::Close(frame) => {
            info!("[{}] WebSocket closed by client: {:?}", session.id(), frame);
            Ok(false)
        }
    }
}
