//! Workspace storage backed by a local directory

use crate::ports::{EntryKind, WorkspaceStorage};
use crate::utils::normalize_path;
use crate::validator::validate_path;
use crate::{AutocodeError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a workspace path to a location under the root. Paths that could
    /// leave the root never reach the filesystem.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            return Ok(self.root.clone());
        }
        validate_path(path).map_err(|e| AutocodeError::Storage(e.to_string()))?;
        Ok(self.root.join(normalized))
    }

    /// Workspace-relative form of an absolute path under the root
    pub fn relative(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let joined = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(joined)
    }
}

fn map_io(path: &str, e: std::io::Error) -> AutocodeError {
    if e.kind() == ErrorKind::NotFound {
        AutocodeError::NotFound(path.to_string())
    } else {
        AutocodeError::Storage(format!("{}: {}", path, e))
    }
}

#[async_trait]
impl WorkspaceStorage for LocalStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.entry_kind(path).await?.is_some())
    }

    async fn entry_kind(&self, path: &str) -> Result<Option<EntryKind>> {
        let full = self.resolve(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Directory)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(path, e)),
        }
    }

    async fn read(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        debug!("Writing {} ({} bytes)", full.display(), content.len());
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn ensure_file(&self, path: &str) -> Result<()> {
        if self.exists(path).await? {
            return Ok(());
        }
        self.write(path, "").await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match self.entry_kind(path).await? {
            Some(EntryKind::Directory) => tokio::fs::remove_dir_all(&full).await,
            Some(EntryKind::File) => tokio::fs::remove_file(&full).await,
            None => return Err(AutocodeError::NotFound(path.to_string())),
        }
        .map_err(|e| map_io(path, e))
    }

    async fn move_path(&self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(to, e))?;
        }
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| map_io(from, e))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let start = self.resolve(prefix)?;
        let mut files = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(map_io(prefix, e)),
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| map_io(prefix, e))? {
                let file_type = entry.file_type().await.map_err(|e| map_io(prefix, e))?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if let Some(rel) = self.relative(&entry.path()) {
                    files.push(rel);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}
