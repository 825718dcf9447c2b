//! Workspace file watcher
//!
//! Turns changes made outside the engine into `External` file events.
//! Writes the executor made itself are recognised through [`RecentWrites`]
//! and dropped, so a participant never re-broadcasts its own changes.

use crate::executor::RecentWrites;
use crate::ports::{EditorPort, EntryKind, WorkspaceStorage};
use crate::storage::LocalStorage;
use crate::{AutocodeError, ChangeSource, FileChangeKind, FileSyncEvent, Result};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long after an engine write a matching fs event counts as an echo
const ECHO_WINDOW: Duration = Duration::from_secs(2);

pub const DEFAULT_IGNORE: &[&str] = &[".git", "node_modules", "target"];

pub struct WorkspaceWatcher {
    root: PathBuf,
    workspace_id: String,
    debounce: Duration,
    ignore: Vec<String>,
    recent_writes: Option<Arc<RecentWrites>>,
    editor: Option<Arc<dyn EditorPort>>,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
}

impl WorkspaceWatcher {
    pub fn new(root: impl Into<PathBuf>, workspace_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            workspace_id: workspace_id.into(),
            debounce: Duration::from_millis(300),
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            recent_writes: None,
            editor: None,
            debouncer: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Top-level directory names to ignore, replacing the defaults
    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_recent_writes(mut self, recent_writes: Arc<RecentWrites>) -> Self {
        self.recent_writes = Some(recent_writes);
        self
    }

    /// Flag every externally changed file in this editor
    pub fn with_editor(mut self, editor: Arc<dyn EditorPort>) -> Self {
        self.editor = Some(editor);
        self
    }

    pub fn is_running(&self) -> bool {
        self.debouncer.is_some()
    }

    /// Start watching. Events arrive on the returned channel until the
    /// watcher is stopped or dropped.
    pub fn start(&mut self) -> Result<mpsc::UnboundedReceiver<FileSyncEvent>> {
        let root = std::fs::canonicalize(&self.root).map_err(|e| {
            AutocodeError::Watch(format!("cannot watch {}: {}", self.root.display(), e))
        })?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<PathBuf>();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            self.debounce,
            move |res: std::result::Result<
                Vec<notify_debouncer_mini::DebouncedEvent>,
                notify::Error,
            >| match res {
                Ok(events) => {
                    for event in events {
                        if event.kind == DebouncedEventKind::Any {
                            let _ = raw_tx.send(event.path);
                        }
                    }
                }
                Err(e) => warn!("Watch error: {}", e),
            },
        )
        .map_err(|e| AutocodeError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| AutocodeError::Watch(e.to_string()))?;

        info!(
            "Watching {} for workspace {} (debounce {:?})",
            root.display(),
            self.workspace_id,
            self.debounce
        );

        let translator = ChangeTranslator {
            storage: LocalStorage::new(root),
            workspace_id: self.workspace_id.clone(),
            ignore: self.ignore.clone(),
            recent_writes: self.recent_writes.clone(),
            editor: self.editor.clone(),
            echo_window: ECHO_WINDOW,
            known: HashSet::new(),
        };
        tokio::spawn(translator.run(raw_rx, tx));

        self.debouncer = Some(debouncer);
        Ok(rx)
    }

    pub fn stop(&mut self) {
        if self.debouncer.take().is_some() {
            info!("Stopped watching {}", self.root.display());
        }
    }
}

/// Whether a workspace-relative path falls under an ignored directory
pub fn is_ignored(path: &str, ignore: &[String]) -> bool {
    path.split('/')
        .next()
        .map(|first| ignore.iter().any(|i| i == first))
        .unwrap_or(false)
}

struct ChangeTranslator {
    storage: LocalStorage,
    workspace_id: String,
    ignore: Vec<String>,
    recent_writes: Option<Arc<RecentWrites>>,
    editor: Option<Arc<dyn EditorPort>>,
    echo_window: Duration,
    /// Files known to exist, to tell creations from updates
    known: HashSet<String>,
}

impl ChangeTranslator {
    async fn run(
        mut self,
        mut raw: mpsc::UnboundedReceiver<PathBuf>,
        tx: mpsc::UnboundedSender<FileSyncEvent>,
    ) {
        match self.storage.list("").await {
            Ok(files) => {
                self.known = files
                    .into_iter()
                    .filter(|f| !is_ignored(f, &self.ignore))
                    .collect();
            }
            Err(e) => warn!("Could not list workspace: {}", e),
        }

        while let Some(path) = raw.recv().await {
            for event in self.translate(&path).await {
                if let Some(editor) = &self.editor {
                    if let Err(e) = editor.mark_file_as_externally_modified(&event.path).await {
                        warn!("Failed to flag {} in editor: {}", event.path, e);
                    }
                }
                if tx.send(event).is_err() {
                    debug!("Watch receiver dropped, stopping");
                    return;
                }
            }
        }
    }

    async fn translate(&mut self, absolute: &Path) -> Vec<FileSyncEvent> {
        let Some(path) = self.storage.relative(absolute) else {
            return Vec::new();
        };
        if path.is_empty() || is_ignored(&path, &self.ignore) {
            return Vec::new();
        }

        let entry = match self.storage.entry_kind(&path).await {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping {}: {}", path, e);
                return Vec::new();
            }
        };

        let echo = match &self.recent_writes {
            Some(recent) => {
                recent.prune(self.echo_window);
                recent.was_recent(&path, self.echo_window)
            }
            None => false,
        };

        match entry {
            Some(EntryKind::Directory) => Vec::new(),
            Some(EntryKind::File) => {
                let kind = if self.known.insert(path.clone()) {
                    FileChangeKind::Created
                } else {
                    FileChangeKind::Updated
                };
                if echo {
                    debug!("Ignoring echo of own write to {}", path);
                    return Vec::new();
                }
                // Binary files travel without content
                let content = self.storage.read(&path).await.ok();
                vec![self.event(kind, path, content)]
            }
            None => {
                let prefix = format!("{}/", path);
                let mut removed: Vec<String> = self
                    .known
                    .iter()
                    .filter(|k| **k == path || k.starts_with(&prefix))
                    .cloned()
                    .collect();
                removed.sort();
                for gone in &removed {
                    self.known.remove(gone);
                }
                if echo {
                    debug!("Ignoring echo of own delete of {}", path);
                    return Vec::new();
                }
                removed
                    .into_iter()
                    .map(|p| self.event(FileChangeKind::Deleted, p, None))
                    .collect()
            }
        }
    }

    fn event(&self, kind: FileChangeKind, path: String, content: Option<String>) -> FileSyncEvent {
        FileSyncEvent::new(
            kind,
            path,
            content,
            self.workspace_id.clone(),
            ChangeSource::External,
        )
    }
}
