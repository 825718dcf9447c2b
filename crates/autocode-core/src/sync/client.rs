//! In-process connection to a [`WorkspaceHub`]

use super::hub::WorkspaceHub;
use crate::ports::SyncTransport;
use crate::{FileSyncEvent, Result, ServerMessage};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

const EVENT_BUFFER: usize = 256;

/// A hub member living in the same process as the hub
pub struct HubClient {
    hub: WorkspaceHub,
    client_id: String,
    events: broadcast::Sender<FileSyncEvent>,
    forward: JoinHandle<()>,
}

impl HubClient {
    pub async fn connect(hub: WorkspaceHub) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let client_id = hub.register(tx).await;
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let forward = {
            let events = events.clone();
            let client_id = client_id.clone();
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if let ServerMessage::FileEvent { event } = msg {
                        // No subscribers is fine
                        let _ = events.send(event);
                    }
                }
                debug!("Hub client {} forwarder stopped", client_id);
            })
        };

        Self {
            hub,
            client_id,
            events,
            forward,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn disconnect(&self) {
        self.hub.unregister(&self.client_id).await;
        self.forward.abort();
    }
}

impl Drop for HubClient {
    fn drop(&mut self) {
        self.forward.abort();
        // Unregistering needs the hub lock; hand it to the runtime if one is still up
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let hub = self.hub.clone();
            let client_id = self.client_id.clone();
            runtime.spawn(async move { hub.unregister(&client_id).await });
        }
    }
}

#[async_trait]
impl SyncTransport for HubClient {
    async fn join(&self, workspace_id: &str) -> Result<()> {
        self.hub.join(&self.client_id, workspace_id).await.map(|_| ())
    }

    async fn leave(&self, workspace_id: &str) -> Result<()> {
        self.hub.leave(&self.client_id, workspace_id).await
    }

    async fn publish(&self, event: FileSyncEvent) -> Result<()> {
        self.hub.publish(&self.client_id, event).await.map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<FileSyncEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::HeadlessEditor;
    use crate::executor::ActionExecutor;
    use crate::storage::MemoryStorage;
    use crate::{ChangeSource, Command, FileChangeKind};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_executor_changes_reach_other_participants() {
        let hub = WorkspaceHub::new();
        let author = Arc::new(HubClient::connect(hub.clone()).await);
        let viewer = HubClient::connect(hub.clone()).await;
        author.join("ws").await.unwrap();
        viewer.join("ws").await.unwrap();
        let mut viewer_events = viewer.subscribe();
        let mut author_events = author.subscribe();

        let executor = ActionExecutor::new(
            "ws",
            Arc::new(MemoryStorage::new()),
            Arc::new(HeadlessEditor::new()),
        )
        .with_sync(author.clone());
        let outcome = executor
            .execute(&Command::create_file("src/main.ts", "console.log(1)"))
            .await;
        assert!(outcome.is_completed());

        let event = tokio::time::timeout(Duration::from_secs(1), viewer_events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, FileChangeKind::Created);
        assert_eq!(event.path, "src/main.ts");
        assert_eq!(event.content.as_deref(), Some("console.log(1)"));
        assert_eq!(event.source, ChangeSource::Ai);
        assert!(event.should_auto_open());

        assert!(author_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_client_leaves_the_hub() {
        let hub = WorkspaceHub::new();
        let client = HubClient::connect(hub.clone()).await;
        client.join("ws").await.unwrap();
        assert_eq!(hub.client_count().await, 1);

        drop(client);

        tokio::time::timeout(Duration::from_secs(1), async {
            while hub.client_count().await > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(hub.members("ws").await.is_empty());
    }

    #[tokio::test]
    async fn test_unjoined_publish_fails() {
        let client = HubClient::connect(WorkspaceHub::new()).await;
        let event = crate::FileSyncEvent::new(
            FileChangeKind::Deleted,
            "a.ts",
            None,
            "ws",
            ChangeSource::User,
        );
        assert!(client.publish(event).await.is_err());
        client.disconnect().await;
    }
}
