//! Commands emitted by the model

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// The four kinds of command the action language can express
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    CreateFile,
    EditFile,
    DeleteFile,
    RunShell,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::CreateFile => "create_file",
            CommandKind::EditFile => "edit_file",
            CommandKind::DeleteFile => "delete_file",
            CommandKind::RunShell => "run_shell",
        }
    }

    /// Whether this kind targets a file path
    pub fn is_file_kind(&self) -> bool {
        !matches!(self, CommandKind::RunShell)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action type: {0}")]
pub struct UnknownCommandKind(pub String);

impl FromStr for CommandKind {
    type Err = UnknownCommandKind;

    /// Accepts the `type` attribute values used by both tag families.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "create" | "create_file" => Ok(CommandKind::CreateFile),
            "edit" | "update" | "edit_file" => Ok(CommandKind::EditFile),
            "delete" | "remove" | "delete_file" => Ok(CommandKind::DeleteFile),
            "shell" | "run" | "command" | "run_shell" => Ok(CommandKind::RunShell),
            other => Err(UnknownCommandKind(other.to_string())),
        }
    }
}

/// A single file or shell intent.
///
/// Each variant carries exactly the fields its kind requires; `content` is the
/// raw, unsanitized payload as written by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    CreateFile {
        path: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    EditFile {
        path: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    DeleteFile {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    RunShell {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl Command {
    pub fn create_file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Command::CreateFile {
            path: path.into(),
            content: content.into(),
            description: None,
        }
    }

    pub fn edit_file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Command::EditFile {
            path: path.into(),
            content: content.into(),
            description: None,
        }
    }

    pub fn delete_file(path: impl Into<String>) -> Self {
        Command::DeleteFile {
            path: path.into(),
            description: None,
        }
    }

    pub fn run_shell(command: impl Into<String>) -> Self {
        Command::RunShell {
            command: command.into(),
            description: None,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateFile { .. } => CommandKind::CreateFile,
            Command::EditFile { .. } => CommandKind::EditFile,
            Command::DeleteFile { .. } => CommandKind::DeleteFile,
            Command::RunShell { .. } => CommandKind::RunShell,
        }
    }

    /// Target path for file commands
    pub fn path(&self) -> Option<&str> {
        match self {
            Command::CreateFile { path, .. }
            | Command::EditFile { path, .. }
            | Command::DeleteFile { path, .. } => Some(path),
            Command::RunShell { .. } => None,
        }
    }

    /// File payload for create/edit commands
    pub fn content(&self) -> Option<&str> {
        match self {
            Command::CreateFile { content, .. } | Command::EditFile { content, .. } => {
                Some(content)
            }
            _ => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Command::CreateFile { description, .. }
            | Command::EditFile { description, .. }
            | Command::DeleteFile { description, .. }
            | Command::RunShell { description, .. } => description.as_deref(),
        }
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match &mut self {
            Command::CreateFile { description, .. }
            | Command::EditFile { description, .. }
            | Command::DeleteFile { description, .. }
            | Command::RunShell { description, .. } => *description = text,
        }
        self
    }
}
