//! Workspace storage collaborator
//!
//! All paths are workspace-relative. Implementations serialize individual
//! calls; there is no cross-call transaction.

use crate::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[async_trait]
pub trait WorkspaceStorage: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Kind of entry at `path`, `None` when absent
    async fn entry_kind(&self, path: &str) -> Result<Option<EntryKind>>;

    async fn read(&self, path: &str) -> Result<String>;

    /// Write full content, replacing any previous content
    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Create a directory and its parents
    async fn ensure_dir(&self, path: &str) -> Result<()>;

    /// Create an empty file if nothing exists at `path`
    async fn ensure_file(&self, path: &str) -> Result<()>;

    async fn remove(&self, path: &str) -> Result<()>;

    async fn move_path(&self, from: &str, to: &str) -> Result<()>;

    /// Files under `prefix` (recursive), sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
