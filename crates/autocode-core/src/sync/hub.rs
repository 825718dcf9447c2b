//! Workspace broadcast groups
//!
//! Every connected client owns an outbound queue. A client belongs to at most
//! one workspace at a time; publishing fans an event out to every other
//! member of the publisher's workspace.

use crate::{AutocodeError, FileSyncEvent, Result, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Member {
    workspace_id: Option<String>,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

#[derive(Clone, Default)]
pub struct WorkspaceHub {
    clients: Arc<RwLock<HashMap<String, Member>>>,
}

impl WorkspaceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its client id
    pub async fn register(&self, tx: mpsc::UnboundedSender<ServerMessage>) -> String {
        let client_id = Uuid::new_v4().to_string();
        let mut clients = self.clients.write().await;
        clients.insert(
            client_id.clone(),
            Member {
                workspace_id: None,
                tx,
            },
        );
        debug!("Client registered: {}", client_id);
        client_id
    }

    pub async fn unregister(&self, client_id: &str) {
        let mut clients = self.clients.write().await;
        if let Some(member) = clients.remove(client_id) {
            match member.workspace_id {
                Some(ws) => info!("Client {} disconnected from workspace {}", client_id, ws),
                None => debug!("Client {} disconnected", client_id),
            }
        }
    }

    /// Put a client into `workspace_id`, leaving whatever it was in before.
    /// Returns the members of the workspace after joining.
    pub async fn join(&self, client_id: &str, workspace_id: &str) -> Result<Vec<String>> {
        let mut clients = self.clients.write().await;
        let member = clients
            .get_mut(client_id)
            .ok_or_else(|| AutocodeError::Sync(format!("unknown client {}", client_id)))?;

        if let Some(previous) = member.workspace_id.replace(workspace_id.to_string()) {
            if previous != workspace_id {
                info!("Client {} left workspace {}", client_id, previous);
            }
        }
        info!("Client {} joined workspace {}", client_id, workspace_id);

        Ok(members_of(&clients, workspace_id))
    }

    pub async fn leave(&self, client_id: &str, workspace_id: &str) -> Result<()> {
        let mut clients = self.clients.write().await;
        let member = clients
            .get_mut(client_id)
            .ok_or_else(|| AutocodeError::Sync(format!("unknown client {}", client_id)))?;

        if member.workspace_id.as_deref() != Some(workspace_id) {
            return Err(AutocodeError::NotJoined(workspace_id.to_string()));
        }
        member.workspace_id = None;
        info!("Client {} left workspace {}", client_id, workspace_id);
        Ok(())
    }

    /// Deliver `event` to every other member of the publisher's workspace.
    /// Returns how many members it reached.
    pub async fn publish(&self, client_id: &str, event: FileSyncEvent) -> Result<usize> {
        let clients = self.clients.read().await;
        let joined = clients
            .get(client_id)
            .and_then(|m| m.workspace_id.clone())
            .ok_or_else(|| AutocodeError::NotJoined(event.workspace_id.clone()))?;

        if joined != event.workspace_id {
            return Err(AutocodeError::Sync(format!(
                "event for workspace {} published from workspace {}",
                event.workspace_id, joined
            )));
        }

        let mut delivered = 0;
        for (id, member) in clients.iter() {
            if id == client_id || member.workspace_id.as_deref() != Some(joined.as_str()) {
                continue;
            }
            let msg = ServerMessage::FileEvent {
                event: event.clone(),
            };
            if member.tx.send(msg).is_ok() {
                delivered += 1;
            } else {
                warn!("Dropping event for closed client {}", id);
            }
        }

        debug!(
            "Published {:?} {} to {} members of {}",
            event.kind, event.path, delivered, joined
        );
        Ok(delivered)
    }

    pub async fn members(&self, workspace_id: &str) -> Vec<String> {
        let clients = self.clients.read().await;
        members_of(&clients, workspace_id)
    }

    pub async fn workspace_of(&self, client_id: &str) -> Option<String> {
        let clients = self.clients.read().await;
        clients.get(client_id).and_then(|m| m.workspace_id.clone())
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

fn members_of(clients: &HashMap<String, Member>, workspace_id: &str) -> Vec<String> {
    let mut members: Vec<String> = clients
        .iter()
        .filter(|(_, m)| m.workspace_id.as_deref() == Some(workspace_id))
        .map(|(id, _)| id.clone())
        .collect();
    members.sort();
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeSource, FileChangeKind};

    fn event(workspace_id: &str, path: &str) -> FileSyncEvent {
        FileSyncEvent::new(
            FileChangeKind::Created,
            path,
            Some("x".into()),
            workspace_id,
            ChangeSource::Ai,
        )
    }

    async fn client(
        hub: &WorkspaceHub,
    ) -> (String, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (hub.register(tx).await, rx)
    }

    #[tokio::test]
    async fn test_publish_reaches_other_members_only() {
        let hub = WorkspaceHub::new();
        let (a, mut rx_a) = client(&hub).await;
        let (b, mut rx_b) = client(&hub).await;
        let (c, mut rx_c) = client(&hub).await;
        let (d, mut rx_d) = client(&hub).await;
        hub.join(&a, "ws1").await.unwrap();
        hub.join(&b, "ws1").await.unwrap();
        hub.join(&c, "ws1").await.unwrap();
        hub.join(&d, "ws2").await.unwrap();

        let delivered = hub.publish(&a, event("ws1", "src/app.ts")).await.unwrap();

        assert_eq!(delivered, 2);
        for rx in [&mut rx_b, &mut rx_c] {
            match rx.try_recv() {
                Ok(ServerMessage::FileEvent { event }) => assert_eq!(event.path, "src/app.ts"),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(rx_a.try_recv().is_err());
        assert!(rx_d.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_requires_membership() {
        let hub = WorkspaceHub::new();
        let (a, _rx) = client(&hub).await;

        let err = hub.publish(&a, event("ws1", "a.ts")).await.unwrap_err();
        assert!(matches!(err, AutocodeError::NotJoined(_)));

        hub.join(&a, "ws1").await.unwrap();
        assert!(hub.publish(&a, event("ws2", "a.ts")).await.is_err());
    }

    #[tokio::test]
    async fn test_join_moves_between_workspaces() {
        let hub = WorkspaceHub::new();
        let (a, _rx_a) = client(&hub).await;
        let (b, _rx_b) = client(&hub).await;

        hub.join(&a, "ws1").await.unwrap();
        let members = hub.join(&b, "ws1").await.unwrap();
        assert_eq!(members.len(), 2);

        hub.join(&a, "ws2").await.unwrap();
        assert_eq!(hub.members("ws1").await, vec![b.clone()]);
        assert_eq!(hub.workspace_of(&a).await.as_deref(), Some("ws2"));

        assert!(hub.leave(&b, "ws2").await.is_err());
        hub.leave(&b, "ws1").await.unwrap();
        assert!(hub.members("ws1").await.is_empty());

        hub.unregister(&a).await;
        assert_eq!(hub.client_count().await, 1);
    }
}
