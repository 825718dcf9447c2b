//! Watch command - share external edits with the workspace
//!
//! Files changed on disk by anything other than autocode are published to
//! the sync server. Events from other members are printed and, with
//! `--mirror`, written into the local workspace.
//!
//! `autocode run` relays external edits itself while it is open, so this is
//! for the time between sessions.

use super::{load_config, start_watcher};
use crate::transport::WsSyncTransport;
use anyhow::Result;
use autocode_core::ports::{SyncTransport, WorkspaceStorage};
use autocode_core::storage::LocalStorage;
use autocode_core::utils::parent_dir;
use autocode_core::{EngineConfig, FileChangeKind, FileSyncEvent, RecentWrites};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

pub async fn run(dir: &Path, mirror: bool) -> Result<()> {
    let config = load_config(dir)?;
    let recent = Arc::new(RecentWrites::new());
    let storage = LocalStorage::new(&config.workspace.root);

    let (mut watcher, mut local) = start_watcher(&config, recent.clone())?;

    let sync = match &config.sync.url {
        Some(url) => Some(connect_with_backoff(url, &config).await?),
        None => {
            println!(
                "{} sync.url not set, watching locally only",
                "⚠️".yellow()
            );
            None
        }
    };
    let mut remote = sync.as_ref().map(|s| s.subscribe());

    println!(
        "{} {} {}",
        "Watching".cyan().bold(),
        config.workspace.root.display(),
        "(Ctrl-C to stop)".dimmed()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = local.recv() => {
                print_event("local", &event);
                if let Some(sync) = &sync {
                    if let Err(e) = sync.publish(event).await {
                        warn!("Failed to publish change: {}", e);
                    }
                }
            }
            received = recv_remote(&mut remote) => match received {
                Ok(event) => {
                    print_event("remote", &event);
                    if mirror {
                        if let Err(e) = mirror_event(&storage, &recent, &event).await {
                            error!("Failed to mirror {}: {}", event.path, e);
                        }
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Missed {} remote events", n),
                Err(RecvError::Closed) => {
                    println!("{}", "Sync connection closed".red());
                    break;
                }
            },
        }
    }

    watcher.stop();
    if let Some(sync) = &sync {
        let _ = sync.leave(&config.workspace.id).await;
    }
    Ok(())
}

async fn recv_remote(
    remote: &mut Option<tokio::sync::broadcast::Receiver<FileSyncEvent>>,
) -> std::result::Result<FileSyncEvent, RecvError> {
    match remote {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn connect_with_backoff(url: &str, config: &EngineConfig) -> Result<WsSyncTransport> {
    let mut backoff = 1;
    loop {
        let attempt = async {
            let transport = WsSyncTransport::connect(url).await?;
            transport.join(&config.workspace.id).await?;
            anyhow::Ok(transport)
        };
        match attempt.await {
            Ok(transport) => return Ok(transport),
            Err(e) => {
                error!("Sync connection failed: {:#}", e);
                error!("Retrying in {} seconds...", backoff);
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
                    _ = tokio::time::sleep(Duration::from_secs(backoff)) => {}
                }
                backoff = std::cmp::min(backoff * 2, 30);
            }
        }
    }
}

fn print_event(origin: &str, event: &FileSyncEvent) {
    let kind = match event.kind {
        FileChangeKind::Created => "created".green(),
        FileChangeKind::Updated => "updated".yellow(),
        FileChangeKind::Deleted => "deleted".red(),
    };
    println!(
        "{} {} {} {}",
        format!("[{}]", origin).dimmed(),
        kind,
        event.path,
        format!("by {}", event.source).dimmed()
    );
}

/// Apply a remote change locally without echoing it back out
pub async fn mirror_event(
    storage: &dyn WorkspaceStorage,
    recent: &RecentWrites,
    event: &FileSyncEvent,
) -> autocode_core::Result<()> {
    match event.kind {
        FileChangeKind::Created | FileChangeKind::Updated => {
            let Some(content) = &event.content else {
                info!("Remote change to {} carries no content, skipping", event.path);
                return Ok(());
            };
            if let Some(parent) = parent_dir(&event.path) {
                storage.ensure_dir(parent).await?;
            }
            recent.record(&event.path);
            storage.write(&event.path, content).await
        }
        FileChangeKind::Deleted => {
            if storage.exists(&event.path).await? {
                recent.record(&event.path);
                storage.remove(&event.path).await?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autocode_core::storage::MemoryStorage;
    use autocode_core::ChangeSource;

    fn remote(kind: FileChangeKind, path: &str, content: Option<&str>) -> FileSyncEvent {
        FileSyncEvent::new(kind, path, content.map(str::to_string), "ws", ChangeSource::User)
    }

    #[tokio::test]
    async fn test_mirror_applies_remote_changes() {
        let storage = MemoryStorage::new();
        let recent = RecentWrites::new();

        mirror_event(
            &storage,
            &recent,
            &remote(FileChangeKind::Created, "src/deep/a.ts", Some("a")),
        )
        .await
        .unwrap();
        assert_eq!(storage.get("src/deep/a.ts").as_deref(), Some("a"));
        assert!(recent.was_recent("src/deep/a.ts", Duration::from_secs(5)));

        mirror_event(&storage, &recent, &remote(FileChangeKind::Updated, "src/deep/a.ts", None))
            .await
            .unwrap();
        assert_eq!(storage.get("src/deep/a.ts").as_deref(), Some("a"));

        mirror_event(&storage, &recent, &remote(FileChangeKind::Deleted, "src/deep/a.ts", None))
            .await
            .unwrap();
        assert!(storage.get("src/deep/a.ts").is_none());

        mirror_event(&storage, &recent, &remote(FileChangeKind::Deleted, "gone.ts", None))
            .await
            .unwrap();
    }
}
