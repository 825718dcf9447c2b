//! WebSocket connection to the sync server
//!
//! The server answers every client message in order, so replies are matched
//! to requests first-in first-out. File events published by other members
//! arrive unsolicited and go to subscribers.

use anyhow::Context;
use async_trait::async_trait;
use autocode_core::ports::SyncTransport;
use autocode_core::{AutocodeError, ClientMessage, FileSyncEvent, Result, ServerMessage};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_BUFFER: usize = 256;

type PendingReplies = Arc<Mutex<VecDeque<oneshot::Sender<ServerMessage>>>>;

pub struct WsSyncTransport {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    pending: PendingReplies,
    events: broadcast::Sender<FileSyncEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl WsSyncTransport {
    pub async fn connect(server_url: &str) -> anyhow::Result<Self> {
        let ws_url = build_ws_url(server_url);
        info!("Connecting to sync server: {}", ws_url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .with_context(|| format!("Failed to connect to WebSocket: {}", ws_url))?;
        info!("Connected to sync server: {}", ws_url);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let pending: PendingReplies = Arc::new(Mutex::new(VecDeque::new()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        let reader = {
            let pending = pending.clone();
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(msg) = ws_receiver.next().await {
                    let text = match msg {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("Sync connection error: {}", e);
                            break;
                        }
                    };
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::FileEvent { event }) => {
                            debug!("Remote {:?} {}", event.kind, event.path);
                            let _ = events.send(event);
                        }
                        Ok(reply) => {
                            let waiter = pending.lock().ok().and_then(|mut p| p.pop_front());
                            match waiter {
                                Some(tx) => {
                                    let _ = tx.send(reply);
                                }
                                None => debug!("Unsolicited reply: {:?}", reply),
                            }
                        }
                        Err(e) => warn!("Failed to parse server message: {}", e),
                    }
                }
                info!("Sync connection closed");
                // Waiters see their sender dropped
                if let Ok(mut p) = pending.lock() {
                    p.clear();
                }
            })
        };

        Ok(Self {
            outbound,
            pending,
            events,
            tasks: vec![writer, reader],
        })
    }

    async fn request(&self, msg: ClientMessage) -> Result<ServerMessage> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| AutocodeError::Sync("connection state poisoned".into()))?;
            pending.push_back(tx);
            self.outbound
                .send(msg)
                .map_err(|_| AutocodeError::Sync("connection closed".into()))?;
        }

        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(ServerMessage::Error { code, message })) if code == "not_joined" => {
                Err(AutocodeError::NotJoined(message))
            }
            Ok(Ok(ServerMessage::Error { code, message })) => {
                Err(AutocodeError::Sync(format!("{}: {}", code, message)))
            }
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AutocodeError::Sync("connection closed".into())),
            Err(_) => Err(AutocodeError::Sync("timed out waiting for server".into())),
        }
    }
}

impl Drop for WsSyncTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl SyncTransport for WsSyncTransport {
    async fn join(&self, workspace_id: &str) -> Result<()> {
        match self
            .request(ClientMessage::Join {
                workspace_id: workspace_id.to_string(),
            })
            .await?
        {
            ServerMessage::Joined {
                client_id, members, ..
            } => {
                info!(
                    "Joined workspace {} as {} ({} members)",
                    workspace_id, client_id, members
                );
                Ok(())
            }
            other => Err(AutocodeError::Sync(format!("unexpected reply: {:?}", other))),
        }
    }

    async fn leave(&self, workspace_id: &str) -> Result<()> {
        self.request(ClientMessage::Leave {
            workspace_id: workspace_id.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn publish(&self, event: FileSyncEvent) -> Result<()> {
        if let ServerMessage::Published { path, delivered } =
            self.request(ClientMessage::Publish { event }).await?
        {
            debug!("Published {} to {} members", path, delivered);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<FileSyncEvent> {
        self.events.subscribe()
    }
}

/// Accept http(s) base URLs as well as ws(s) ones
pub fn build_ws_url(server_url: &str) -> String {
    let ws_url = server_url
        .trim_end_matches('/')
        .replace("https://", "wss://")
        .replace("http://", "ws://");
    if ws_url.ends_with("/ws") {
        return ws_url;
    }
    if let Some(idx) = ws_url.find("/api") {
        return format!("{}/ws", &ws_url[..idx]);
    }
    format!("{}/ws", ws_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ws_url() {
        assert_eq!(build_ws_url("http://localhost:16790"), "ws://localhost:16790/ws");
        assert_eq!(build_ws_url("https://sync.example.com/"), "wss://sync.example.com/ws");
        assert_eq!(build_ws_url("ws://host/ws"), "ws://host/ws");
        assert_eq!(build_ws_url("https://host/api/v1"), "wss://host/ws");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        assert!(WsSyncTransport::connect("ws://127.0.0.1:9").await.is_err());
    }
}
