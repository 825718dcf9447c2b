//! Apply command - run the commands of a saved model response

use super::parse::print_parsed;
use super::{build_runner, connect_sync, load_config, read_input, summarize, ConsoleProgress};
use anyhow::Result;
use autocode_core::ports::SyncTransport;
use autocode_core::{
    parse_response, ArtifactRunner, ChangeSource, EngineConfig, OperationProgress,
    ParsedResponse, RecentWrites,
};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(dir: &Path, file: Option<&Path>, dry_run: bool) -> Result<()> {
    let text = read_input(file).await?;
    let parsed = parse_response(&text);

    if dry_run || parsed.is_empty() {
        print_parsed(&parsed);
        return Ok(());
    }

    let config = load_config(dir)?;
    let sync = connect_sync(&config).await?;
    let runner = manual_runner(&config, sync)?;

    println!(
        "{} {} commands to {}",
        "Applying".cyan().bold(),
        parsed.command_count(),
        config.workspace.root.display()
    );

    let cancel = CancellationToken::new();
    let watch_ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping after the current action");
                cancel.cancel();
            }
        })
    };

    let results = apply_parsed(&runner, &parsed, &cancel).await;
    watch_ctrl_c.abort();

    if cancel.is_cancelled() {
        println!("{}", "Cancelled".yellow());
    }
    summarize(&results)
}

/// Changes applied by hand are published as user edits
pub fn manual_runner(
    config: &EngineConfig,
    sync: Option<Arc<dyn SyncTransport>>,
) -> Result<ArtifactRunner> {
    build_runner(config, sync, ChangeSource::User, Arc::new(RecentWrites::new()))
}

/// Artifacts in order, then the standalone batch
pub async fn apply_parsed(
    runner: &ArtifactRunner,
    parsed: &ParsedResponse,
    cancel: &CancellationToken,
) -> Vec<OperationProgress> {
    let mut results = Vec::new();
    for artifact in &parsed.artifacts {
        if cancel.is_cancelled() {
            break;
        }
        println!("{} {}", "▸".cyan(), artifact.title.bold());
        results.extend(runner.run_artifact(artifact, &ConsoleProgress, cancel).await);
    }
    if !parsed.actions.is_empty() && !cancel.is_cancelled() {
        results.extend(runner.run_actions(&parsed.actions, &ConsoleProgress, cancel).await);
    }
    results
}
