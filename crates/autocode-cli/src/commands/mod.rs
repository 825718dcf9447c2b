//! CLI commands and the helpers they share

pub mod apply;
pub mod init;
pub mod parse;
pub mod run;
pub mod watch;

use crate::editor::TerminalEditor;
use crate::transport::WsSyncTransport;
use anyhow::{Context, Result};
use autocode_core::ports::SyncTransport;
use autocode_core::runner::ProgressSink;
use autocode_core::storage::LocalStorage;
use autocode_core::watcher::WorkspaceWatcher;
use autocode_core::{
    ActionExecutor, ArtifactRunner, ChangeSource, EngineConfig, FileSyncEvent, OperationProgress,
    OperationStatus, RecentWrites,
};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub fn load_config(dir: &Path) -> Result<EngineConfig> {
    EngineConfig::load(dir)
        .with_context(|| format!("Failed to load configuration from {}", dir.display()))
}

/// Connect and join the configured workspace, if sync is configured
pub async fn connect_sync(config: &EngineConfig) -> Result<Option<Arc<dyn SyncTransport>>> {
    let Some(url) = &config.sync.url else {
        return Ok(None);
    };
    let transport = WsSyncTransport::connect(url).await?;
    transport
        .join(&config.workspace.id)
        .await
        .with_context(|| format!("Failed to join workspace {}", config.workspace.id))?;
    Ok(Some(Arc::new(transport)))
}

/// Runner applying commands to the configured workspace directory.
///
/// Every write lands in `recent`; a watcher sharing the same ledger skips it.
pub fn build_runner(
    config: &EngineConfig,
    sync: Option<Arc<dyn SyncTransport>>,
    source: ChangeSource,
    recent: Arc<RecentWrites>,
) -> Result<ArtifactRunner> {
    let storage = Arc::new(LocalStorage::new(&config.workspace.root));
    let mut executor = ActionExecutor::new(
        config.workspace.id.clone(),
        storage,
        Arc::new(TerminalEditor::new()),
    )
    .with_validator(config.validator()?)
    .with_source(source)
    .with_recent_writes(recent);
    if let Some(sync) = sync {
        executor = executor.with_sync(sync);
    }
    Ok(ArtifactRunner::new(Arc::new(executor)).with_action_delay(config.action_delay()))
}

/// Watch the workspace root for changes not recorded in `recent`
pub fn start_watcher(
    config: &EngineConfig,
    recent: Arc<RecentWrites>,
) -> Result<(WorkspaceWatcher, mpsc::UnboundedReceiver<FileSyncEvent>)> {
    let mut watcher = WorkspaceWatcher::new(&config.workspace.root, config.workspace.id.clone())
        .with_debounce(config.debounce())
        .with_ignore(config.watcher.ignore.clone())
        .with_recent_writes(recent)
        .with_editor(Arc::new(TerminalEditor::new()));
    let events = watcher.start().context("Failed to start file watcher")?;
    Ok((watcher, events))
}

/// Publish external edits until the returned task is aborted
pub fn relay_external_changes(
    config: &EngineConfig,
    recent: Arc<RecentWrites>,
    sync: Arc<dyn SyncTransport>,
) -> Result<JoinHandle<()>> {
    let (watcher, mut events) = start_watcher(config, recent)?;
    Ok(tokio::spawn(async move {
        let _watcher = watcher;
        while let Some(event) = events.recv().await {
            debug!("Relaying external {:?} {}", event.kind, event.path);
            if let Err(e) = sync.publish(event).await {
                warn!("Failed to publish change: {}", e);
            }
        }
    }))
}

/// Response text from a file, or stdin when no file is given
pub async fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

pub fn print_progress(artifact_id: Option<&str>, progress: &OperationProgress) {
    let target = progress
        .path
        .clone()
        .unwrap_or_else(|| progress.action.to_string());
    let scope = artifact_id
        .map(|id| format!("[{}] ", id))
        .unwrap_or_default();
    match progress.status {
        OperationStatus::Completed => {
            println!("{} {}{} {}", "✓".green(), scope.dimmed(), progress.action, target)
        }
        OperationStatus::Failed => println!(
            "{} {}{} {}: {}",
            "✗".red(),
            scope.dimmed(),
            progress.action,
            target,
            progress.error.as_deref().unwrap_or("failed").red()
        ),
        OperationStatus::Running | OperationStatus::Pending => {}
    }
}

/// Progress sink printing final states
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn progress(&self, artifact_id: Option<&str>, progress: &OperationProgress) {
        print_progress(artifact_id, progress);
    }
}

/// One-line tally; errors when anything failed
pub fn summarize(results: &[OperationProgress]) -> Result<()> {
    let failed = results.iter().filter(|p| p.is_failed()).count();
    let done = results.len() - failed;
    println!();
    if failed == 0 {
        println!("{} {} actions applied", "Done:".green().bold(), done);
        Ok(())
    } else {
        println!(
            "{} {} applied, {} failed",
            "Done:".yellow().bold(),
            done,
            failed
        );
        anyhow::bail!("{} action(s) failed", failed)
    }
}
