//! Sync transport collaborator

use crate::{FileSyncEvent, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Connection to the workspace broadcast group.
///
/// A connection belongs to at most one workspace at a time. Events published
/// through it reach every other member of that workspace, never the
/// publisher itself.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn join(&self, workspace_id: &str) -> Result<()>;

    async fn leave(&self, workspace_id: &str) -> Result<()>;

    async fn publish(&self, event: FileSyncEvent) -> Result<()>;

    /// Events published by other members, best-effort
    fn subscribe(&self) -> broadcast::Receiver<FileSyncEvent>;
}
