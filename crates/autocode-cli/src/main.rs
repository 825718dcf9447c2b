//! Autocode CLI
//!
//! Streams model responses, applies the file actions they contain to a
//! workspace, and keeps workspace participants in sync.

mod commands;
mod editor;
mod transport;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autocode")]
#[command(author, version, about = "Autocode - apply model-authored file actions to a workspace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace directory
    #[arg(short = 'C', long = "dir", global = true, default_value = ".")]
    dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default autocode.toml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the artifacts and actions in a model response
    Parse {
        /// Response file (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply the actions in a saved model response
    Apply {
        /// Response file (reads stdin when omitted)
        file: Option<PathBuf>,

        /// Only show what would be done
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Ask the model and apply its actions (interactive without a prompt)
    Run {
        prompt: Option<String>,

        /// Override the configured model
        #[arg(short, long)]
        model: Option<String>,

        /// Echo the response text as it streams in
        #[arg(short, long)]
        stream: bool,
    },

    /// Publish external file changes and follow other participants
    Watch {
        /// Write changes from other participants into this workspace
        #[arg(long)]
        mirror: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "autocode_cli=debug,autocode_core=debug"
    } else {
        "autocode_cli=info,autocode_core=warn"
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    info!("Starting Autocode CLI");

    let dir = cli.dir;
    let result = match cli.command {
        Commands::Init { force } => commands::init::run(&dir, force).await,
        Commands::Parse { file, json } => commands::parse::run(file.as_deref(), json).await,
        Commands::Apply { file, dry_run } => {
            commands::apply::run(&dir, file.as_deref(), dry_run).await
        }
        Commands::Run {
            prompt,
            model,
            stream,
        } => {
            commands::run::execute(
                &dir,
                commands::run::RunOptions {
                    prompt,
                    model,
                    show_stream: stream,
                },
            )
            .await
        }
        Commands::Watch { mirror } => commands::watch::run(&dir, mirror).await,
    };

    if let Err(ref e) = result {
        error!("Command failed: {}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    result
}
