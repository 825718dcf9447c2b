//! Run command - stream a model response and apply it as it completes
//!
//! With a prompt, runs one exchange. Without one, reads prompts from stdin
//! line by line and keeps the conversation going.

use super::{
    build_runner, connect_sync, load_config, print_progress, relay_external_changes, summarize,
};
use crate::transport::OpenAiTransport;
use anyhow::Result;
use autocode_core::{ChangeSource, RecentWrites, SessionController, SessionEvent, SessionOutcome};
use colored::Colorize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

pub struct RunOptions {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub show_stream: bool,
}

pub async fn execute(dir: &Path, options: RunOptions) -> Result<()> {
    let mut config = load_config(dir)?;
    if let Some(model) = options.model {
        config.model.model = model;
    }

    let sync = connect_sync(&config).await?;
    let recent = Arc::new(RecentWrites::new());
    // Edits made by hand while the model works are shared too, minus our own writes
    let relay = match &sync {
        Some(sync) => Some(relay_external_changes(&config, recent.clone(), sync.clone())?),
        None => None,
    };
    let runner = build_runner(&config, sync, ChangeSource::Ai, recent)?;
    let transport = OpenAiTransport::from_config(&config.model);
    let controller = Arc::new(
        SessionController::new(Arc::new(transport), Arc::new(runner))
            .with_system_prompt(config.system_prompt()),
    );

    info!(
        "Using model {} at {} for workspace {}",
        config.model.model, config.model.endpoint, config.workspace.id
    );

    let ctrl_c = {
        let controller = controller.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                controller.cancel();
            }
        })
    };

    let result = match options.prompt {
        Some(prompt) => exchange(&controller, &prompt, options.show_stream).await,
        None => repl(&controller, options.show_stream).await,
    };
    ctrl_c.abort();
    if let Some(relay) = relay {
        relay.abort();
    }
    result
}

async fn repl(controller: &SessionController, show_stream: bool) -> Result<()> {
    println!(
        "{} {}",
        "autocode".cyan().bold(),
        "(empty line to skip, 'exit' to quit, Ctrl-C cancels a response)".dimmed()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        match prompt {
            "" => continue,
            "exit" | "quit" => break,
            _ => {
                // A failed exchange does not end the conversation
                if let Err(e) = exchange(controller, prompt, show_stream).await {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                }
            }
        }
    }
    Ok(())
}

async fn exchange(controller: &SessionController, prompt: &str, show_stream: bool) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx, show_stream));
    let outcome = controller.run(prompt, tx).await;
    let _ = printer.await;

    match outcome {
        SessionOutcome::Completed { results, .. } if results.is_empty() => {
            println!("{}", "No actions in response".dimmed());
            Ok(())
        }
        SessionOutcome::Completed { results, .. } => summarize(&results),
        SessionOutcome::Cancelled => {
            println!("{}", "Cancelled".yellow());
            Ok(())
        }
        SessionOutcome::Failed { message } => anyhow::bail!(message),
    }
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<SessionEvent>, show_stream: bool) {
    let mut printed = 0;
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Snapshot { response, .. } => {
                if show_stream && response.content.len() > printed {
                    print!("{}", response.content[printed..].dimmed());
                    let _ = std::io::stdout().flush();
                    printed = response.content.len();
                }
                if response.is_complete && printed > 0 {
                    println!();
                }
            }
            SessionEvent::ArtifactClosed { title, .. } => {
                if show_stream {
                    println!();
                }
                println!("{} {}", "▸".cyan(), title.bold());
            }
            SessionEvent::Progress {
                artifact_id,
                progress,
                ..
            } => print_progress(artifact_id.as_deref(), &progress),
            SessionEvent::Error { message, .. } => {
                eprintln!("{} {}", "Model error:".red().bold(), message)
            }
            SessionEvent::Started { .. }
            | SessionEvent::Cancelled { .. }
            | SessionEvent::Finished { .. } => {}
        }
    }
}
