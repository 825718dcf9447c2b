//! Applies one command to a workspace
//!
//! Each command goes `Validating -> Rejected` or `Validating -> Running ->
//! Completed | Failed`. Nothing here returns an error to the caller: every
//! failure becomes an [`ActionOutcome`] carrying a readable message.

use crate::ports::{EditorPort, EntryKind, OpenFileRequest, SyncTransport, WorkspaceStorage};
use crate::utils::{file_name, language_for_path, normalize_path, parent_dir};
use crate::validator::{ValidationError, Validator};
use crate::{
    AutocodeError, ChangeSource, Command, FileChangeKind, FileSyncEvent, OperationProgress,
    Result,
};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Paths recently written by an executor, so file watchers can tell the
/// engine's own writes apart from external edits.
#[derive(Default)]
pub struct RecentWrites {
    writes: DashMap<String, Instant>,
}

impl RecentWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &str) {
        self.writes.insert(normalize_path(path), Instant::now());
    }

    /// Whether `path` was written within `window`
    pub fn was_recent(&self, path: &str, window: Duration) -> bool {
        self.writes
            .get(&normalize_path(path))
            .map(|at| at.elapsed() <= window)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Drop entries older than `window`
    pub fn prune(&self, window: Duration) {
        self.writes.retain(|_, at| at.elapsed() <= window);
    }
}

/// Result of executing one command
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Completed { event: Option<FileSyncEvent> },
    Rejected { reason: ValidationError },
    Failed { error: String },
}

impl ActionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ActionOutcome::Completed { .. })
    }

    pub fn event(&self) -> Option<&FileSyncEvent> {
        match self {
            ActionOutcome::Completed { event } => event.as_ref(),
            _ => None,
        }
    }

    /// Move a running progress record to its final state
    pub fn finish(&self, progress: &mut OperationProgress) {
        match self {
            ActionOutcome::Completed { .. } => {
                progress.complete();
            }
            ActionOutcome::Rejected { reason } => {
                progress.fail(format!("rejected: {}", reason));
            }
            ActionOutcome::Failed { error } => {
                progress.fail(error.clone());
            }
        }
    }
}

pub struct ActionExecutor {
    workspace_id: String,
    storage: Arc<dyn WorkspaceStorage>,
    editor: Arc<dyn EditorPort>,
    sync: Option<Arc<dyn SyncTransport>>,
    validator: Validator,
    source: ChangeSource,
    recent_writes: Arc<RecentWrites>,
    shell_intents: Mutex<Vec<String>>,
}

impl ActionExecutor {
    pub fn new(
        workspace_id: impl Into<String>,
        storage: Arc<dyn WorkspaceStorage>,
        editor: Arc<dyn EditorPort>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            storage,
            editor,
            sync: None,
            validator: Validator::default(),
            source: ChangeSource::Ai,
            recent_writes: Arc::new(RecentWrites::new()),
            shell_intents: Mutex::new(Vec::new()),
        }
    }

    /// Publish every emitted event on this connection
    pub fn with_sync(mut self, sync: Arc<dyn SyncTransport>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_source(mut self, source: ChangeSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_recent_writes(mut self, recent_writes: Arc<RecentWrites>) -> Self {
        self.recent_writes = recent_writes;
        self
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn recent_writes(&self) -> Arc<RecentWrites> {
        self.recent_writes.clone()
    }

    /// Shell commands recorded so far. They are never run.
    pub fn shell_intents(&self) -> Vec<String> {
        self.shell_intents
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Validate and apply one command
    pub async fn execute(&self, command: &Command) -> ActionOutcome {
        if let Err(reason) = self.validator.validate(command) {
            warn!("Rejected {} action: {}", command.kind(), reason);
            return ActionOutcome::Rejected { reason };
        }

        let result = match command {
            Command::CreateFile { path, content, .. } => self.create_file(path, content).await,
            Command::EditFile { path, content, .. } => self.edit_file(path, content).await,
            Command::DeleteFile { path, .. } => self.delete_file(path).await,
            Command::RunShell { command, .. } => {
                self.record_shell_intent(command);
                Ok(None)
            }
        };

        match result {
            Ok(event) => {
                if let Some(event) = &event {
                    self.publish(event.clone()).await;
                }
                ActionOutcome::Completed { event }
            }
            Err(e) => {
                warn!("{} action failed: {}", command.kind(), e);
                ActionOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Execute and return the final progress record
    pub async fn apply(&self, command: &Command) -> OperationProgress {
        let mut progress = OperationProgress::new(command);
        progress.start();
        self.execute(command).await.finish(&mut progress);
        progress
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<Option<FileSyncEvent>> {
        let path = normalize_path(path);
        if self.storage.entry_kind(&path).await? == Some(EntryKind::Directory) {
            return Err(AutocodeError::Storage(format!(
                "cannot create file {}: a directory exists at that path",
                path
            )));
        }

        let content = self.validator.prepare_content(content).into_owned();
        if let Some(parent) = parent_dir(&path) {
            self.storage.ensure_dir(parent).await?;
        }
        self.storage.write(&path, &content).await?;
        self.recent_writes.record(&path);
        info!("Created {} ({} bytes)", path, content.len());

        self.editor
            .open_file(OpenFileRequest {
                path: path.clone(),
                name: file_name(&path).to_string(),
                content: content.clone(),
                language: language_for_path(&path).to_string(),
            })
            .await?;

        Ok(Some(self.event(FileChangeKind::Created, path, Some(content))))
    }

    /// Upsert: an edit of a missing file is a create
    async fn edit_file(&self, path: &str, content: &str) -> Result<Option<FileSyncEvent>> {
        let path = normalize_path(path);
        match self.storage.entry_kind(&path).await? {
            None => {
                debug!("Edit target {} does not exist, creating it", path);
                return self.create_file(&path, content).await;
            }
            Some(EntryKind::Directory) => {
                return Err(AutocodeError::Storage(format!(
                    "ambiguous edit target {}: it is a directory",
                    path
                )));
            }
            Some(EntryKind::File) => {}
        }

        let content = self.validator.prepare_content(content).into_owned();
        self.storage.write(&path, &content).await?;
        self.recent_writes.record(&path);
        info!("Updated {} ({} bytes)", path, content.len());

        self.editor.update_file_content(&path, &content).await?;

        Ok(Some(self.event(FileChangeKind::Updated, path, Some(content))))
    }

    async fn delete_file(&self, path: &str) -> Result<Option<FileSyncEvent>> {
        let path = normalize_path(path);
        if !self.storage.exists(&path).await? {
            debug!("Delete target {} does not exist", path);
            self.editor.close_file(&path).await?;
            return Ok(None);
        }

        self.storage.remove(&path).await?;
        self.recent_writes.record(&path);
        info!("Deleted {}", path);

        self.editor.close_file(&path).await?;

        Ok(Some(self.event(FileChangeKind::Deleted, path, None)))
    }

    fn record_shell_intent(&self, command: &str) {
        info!("Shell intent recorded, not executed: {}", command);
        if let Ok(mut intents) = self.shell_intents.lock() {
            intents.push(command.to_string());
        }
    }

    fn event(&self, kind: FileChangeKind, path: String, content: Option<String>) -> FileSyncEvent {
        FileSyncEvent::new(kind, path, content, self.workspace_id.clone(), self.source)
    }

    async fn publish(&self, event: FileSyncEvent) {
        let Some(sync) = &self.sync else { return };
        if let Err(e) = sync.publish(event).await {
            warn!("Failed to publish file event: {}", e);
        }
    }
}
