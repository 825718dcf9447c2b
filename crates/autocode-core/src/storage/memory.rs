//! In-memory workspace storage using DashMap

use crate::ports::{EntryKind, WorkspaceStorage};
use crate::utils::{normalize_path, parent_dir};
use crate::{AutocodeError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Entry {
    File(String),
    Dir,
}

/// Workspace file tree held in memory.
///
/// Behaves like a strict filesystem: writing requires the parent directory
/// to exist, and a directory cannot be overwritten by a file.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, creating its parent directories
    pub fn with_file(self, path: &str, content: &str) -> Self {
        let path = normalize_path(path);
        self.insert_ancestors(&path);
        self.entries.insert(path, Entry::File(content.to_string()));
        self
    }

    /// Snapshot of a file's content, for assertions
    pub fn get(&self, path: &str) -> Option<String> {
        match self.entries.get(&normalize_path(path)).map(|e| e.value().clone()) {
            Some(Entry::File(content)) => Some(content),
            _ => None,
        }
    }

    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.value(), Entry::File(_)))
            .count()
    }

    fn insert_ancestors(&self, path: &str) {
        let mut current = parent_dir(path);
        while let Some(dir) = current {
            self.entries.entry(dir.to_string()).or_insert(Entry::Dir);
            current = parent_dir(dir);
        }
    }

    fn kind_of(&self, path: &str) -> Option<EntryKind> {
        if path.is_empty() {
            return Some(EntryKind::Directory);
        }
        self.entries.get(path).map(|e| match e.value() {
            Entry::File(_) => EntryKind::File,
            Entry::Dir => EntryKind::Directory,
        })
    }

    fn subtree_keys(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path);
        self.entries
            .iter()
            .filter(|e| e.key() == path || e.key().starts_with(&prefix))
            .map(|e| e.key().clone())
            .collect()
    }
}

#[async_trait]
impl WorkspaceStorage for MemoryStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.kind_of(&normalize_path(path)).is_some())
    }

    async fn entry_kind(&self, path: &str) -> Result<Option<EntryKind>> {
        Ok(self.kind_of(&normalize_path(path)))
    }

    async fn read(&self, path: &str) -> Result<String> {
        let path = normalize_path(path);
        match self.entries.get(&path).map(|e| e.value().clone()) {
            Some(Entry::File(content)) => Ok(content),
            Some(Entry::Dir) => Err(AutocodeError::Storage(format!("{} is a directory", path))),
            None => Err(AutocodeError::NotFound(path)),
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(AutocodeError::Storage("cannot write to workspace root".into()));
        }
        if let Some(parent) = parent_dir(&path) {
            if self.kind_of(parent) != Some(EntryKind::Directory) {
                return Err(AutocodeError::NotFound(parent.to_string()));
            }
        }
        if self.kind_of(&path) == Some(EntryKind::Directory) {
            return Err(AutocodeError::Storage(format!("{} is a directory", path)));
        }
        self.entries.insert(path, Entry::File(content.to_string()));
        Ok(())
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Ok(());
        }
        let mut current = Some(path.as_str());
        while let Some(dir) = current {
            if self.kind_of(dir) == Some(EntryKind::File) {
                return Err(AutocodeError::Storage(format!("{} is a file", dir)));
            }
            current = parent_dir(dir);
        }
        self.insert_ancestors(&path);
        self.entries.entry(path).or_insert(Entry::Dir);
        Ok(())
    }

    async fn ensure_file(&self, path: &str) -> Result<()> {
        if self.exists(path).await? {
            return Ok(());
        }
        self.write(path, "").await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        let keys = self.subtree_keys(&path);
        if keys.is_empty() {
            return Err(AutocodeError::NotFound(path));
        }
        for key in keys {
            self.entries.remove(&key);
        }
        Ok(())
    }

    async fn move_path(&self, from: &str, to: &str) -> Result<()> {
        let from = normalize_path(from);
        let to = normalize_path(to);
        let keys = self.subtree_keys(&from);
        if keys.is_empty() {
            return Err(AutocodeError::NotFound(from));
        }
        if self.kind_of(&to).is_some() {
            return Err(AutocodeError::Storage(format!("{} already exists", to)));
        }
        self.insert_ancestors(&to);
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                let moved = format!("{}{}", to, &key[from.len()..]);
                self.entries.insert(moved, entry);
            }
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = normalize_path(prefix);
        let dir_prefix = format!("{}/", prefix);
        let mut files: Vec<String> = self
            .entries
            .iter()
            .filter(|e| matches!(e.value(), Entry::File(_)))
            .filter(|e| prefix.is_empty() || e.key() == &prefix || e.key().starts_with(&dir_prefix))
            .map(|e| e.key().clone())
            .collect();
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let storage = MemoryStorage::new();

        assert!(storage.write("src/a.ts", "x").await.is_err());
        storage.ensure_dir("src").await.unwrap();
        storage.write("src/a.ts", "x").await.unwrap();
        assert_eq!(storage.read("./src/a.ts").await.unwrap(), "x");
        assert_eq!(
            storage.entry_kind("src").await.unwrap(),
            Some(EntryKind::Directory)
        );

        storage.remove("src/a.ts").await.unwrap();
        assert!(!storage.exists("src/a.ts").await.unwrap());
        assert!(matches!(
            storage.read("src/a.ts").await,
            Err(AutocodeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_directories_are_not_files() {
        let storage = MemoryStorage::new().with_file("src/lib/a.ts", "a");
        assert!(storage.write("src/lib", "oops").await.is_err());
        assert!(storage.ensure_dir("src/lib/a.ts/nested").await.is_err());
        assert!(storage.read("src").await.is_err());
    }

    #[tokio::test]
    async fn test_move_and_list() {
        let storage = MemoryStorage::new()
            .with_file("old/a.ts", "a")
            .with_file("old/deep/b.ts", "b")
            .with_file("keep.md", "k");

        storage.move_path("old", "new/place").await.unwrap();
        assert_eq!(
            storage.list("").await.unwrap(),
            vec!["keep.md", "new/place/a.ts", "new/place/deep/b.ts"]
        );
        assert_eq!(storage.list("new").await.unwrap().len(), 2);
        assert!(!storage.exists("old").await.unwrap());

        storage.remove("new").await.unwrap();
        assert_eq!(storage.file_count(), 1);
    }

    #[tokio::test]
    async fn test_ensure_file() {
        let storage = MemoryStorage::new().with_file("a.txt", "keep");
        storage.ensure_file("a.txt").await.unwrap();
        storage.ensure_file("b.txt").await.unwrap();
        assert_eq!(storage.get("a.txt").as_deref(), Some("keep"));
        assert_eq!(storage.get("b.txt").as_deref(), Some(""));
    }
}
