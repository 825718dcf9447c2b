//! Editor collaborator that reports to the terminal

use async_trait::async_trait;
use autocode_core::ports::{EditorPort, OpenFileRequest};
use autocode_core::Result;
use colored::Colorize;

#[derive(Default)]
pub struct TerminalEditor;

impl TerminalEditor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EditorPort for TerminalEditor {
    async fn open_file(&self, request: OpenFileRequest) -> Result<()> {
        println!(
            "  {} {} {}",
            "open".green(),
            request.path,
            format!(
                "({}, {} lines)",
                request.language,
                request.content.lines().count()
            )
            .dimmed()
        );
        Ok(())
    }

    async fn update_file_content(&self, path: &str, _content: &str) -> Result<()> {
        println!("  {} {}", "edit".yellow(), path);
        Ok(())
    }

    async fn close_file(&self, path: &str) -> Result<()> {
        println!("  {} {}", "close".red(), path);
        Ok(())
    }

    async fn mark_file_as_externally_modified(&self, path: &str) -> Result<()> {
        println!("  {} {}", "changed on disk".magenta(), path);
        Ok(())
    }
}
