//! Parse command - show what a model response would do, without applying it

use super::read_input;
use anyhow::Result;
use autocode_core::{parse_response, Command, ParsedResponse};
use colored::Colorize;
use serde_json::json;
use std::path::Path;

pub async fn run(file: Option<&Path>, as_json: bool) -> Result<()> {
    let text = read_input(file).await?;
    let parsed = parse_response(&text);

    if as_json {
        let out = json!({
            "artifacts": parsed.artifacts,
            "actions": parsed.actions,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_parsed(&parsed);
    Ok(())
}

pub fn print_parsed(parsed: &ParsedResponse) {
    if parsed.is_empty() {
        println!("{}", "No actions found".yellow());
        return;
    }

    for artifact in &parsed.artifacts {
        println!(
            "{} {} {}",
            "artifact".cyan().bold(),
            artifact.title.bold(),
            format!("({})", artifact.id).dimmed()
        );
        for command in &artifact.actions {
            println!("  {}", describe(command));
        }
    }
    if !parsed.actions.is_empty() {
        println!("{}", "standalone".cyan().bold());
        for command in &parsed.actions {
            println!("  {}", describe(command));
        }
    }
    println!();
    println!("{} commands", parsed.command_count());
}

fn describe(command: &Command) -> String {
    match command {
        Command::CreateFile { path, content, .. } | Command::EditFile { path, content, .. } => {
            format!(
                "{:<12} {} {}",
                command.kind().to_string(),
                path,
                format!("({} bytes)", content.len()).dimmed()
            )
        }
        Command::DeleteFile { path, .. } => format!("{:<12} {}", command.kind().to_string(), path),
        Command::RunShell { command: cmd, .. } => {
            format!("{:<12} {}", command.kind().to_string(), cmd.italic())
        }
    }
}
