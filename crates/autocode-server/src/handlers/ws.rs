//! WebSocket handler for the workspace sync channel
//!
//! Each connection gets an outbound queue registered with the hub. Text
//! frames carry `ClientMessage` JSON; replies and events published by other
//! members go out as `ServerMessage` JSON.

use crate::AppState;
use autocode_core::validator::validate_path;
use autocode_core::AutocodeError;
use autocode_types::{ClientMessage, FileSyncEvent, ServerMessage};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Handle WebSocket upgrade
pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let client_id = state.hub.register(tx.clone()).await;
    info!("New sync connection: {}", client_id);

    let _forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                debug!("Received text message: {} bytes", text.len());
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => handle_message(client_msg, &state, &client_id, &tx).await,
                    Err(e) => {
                        warn!("Failed to parse message: {}", e);
                        let _ = tx.send(ServerMessage::Error {
                            code: "invalid_message".to_string(),
                            message: format!("Failed to parse message: {}", e),
                        });
                    }
                }
            }
            Ok(Message::Binary(bin)) => {
                debug!("Ignoring binary message: {} bytes", bin.len());
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("Sync connection {} closed", client_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        }
    }

    state.hub.unregister(&client_id).await;
    // The forward task ends on its own once the hub and this scope drop
    // their senders, after flushing anything still queued.
}

async fn handle_message(
    msg: ClientMessage,
    state: &AppState,
    client_id: &str,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    let reply = match msg {
        ClientMessage::Ping => ServerMessage::Pong,
        ClientMessage::Join { workspace_id } => {
            match state.hub.join(client_id, &workspace_id).await {
                Ok(members) => ServerMessage::Joined {
                    workspace_id,
                    client_id: client_id.to_string(),
                    members: members.len(),
                },
                Err(e) => error_reply("join_failed", &e),
            }
        }
        ClientMessage::Leave { workspace_id } => {
            match state.hub.leave(client_id, &workspace_id).await {
                Ok(()) => ServerMessage::Left { workspace_id },
                Err(e) => error_reply("leave_failed", &e),
            }
        }
        ClientMessage::Publish { event } => publish(state, client_id, event).await,
    };
    let _ = tx.send(reply);
}

async fn publish(state: &AppState, client_id: &str, event: FileSyncEvent) -> ServerMessage {
    if let Err(e) = validate_path(&event.path) {
        warn!("Client {} published bad path {:?}: {}", client_id, event.path, e);
        return ServerMessage::Error {
            code: "invalid_path".to_string(),
            message: e.to_string(),
        };
    }

    let path = event.path.clone();
    match state.hub.publish(client_id, event).await {
        Ok(delivered) => ServerMessage::Published { path, delivered },
        Err(e) => error_reply("publish_failed", &e),
    }
}

fn error_reply(fallback: &str, e: &AutocodeError) -> ServerMessage {
    let code = match e {
        AutocodeError::NotJoined(_) => "not_joined",
        _ => fallback,
    };
    ServerMessage::Error {
        code: code.to_string(),
        message: e.to_string(),
    }
}
