//! Per-action execution progress

use crate::{Command, CommandKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }
}

/// Progress record for one action.
///
/// Starts `Pending`, moves to `Running` once, then to `Completed` or `Failed`
/// once. Transitions out of order are ignored, so a terminal record is frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationProgress {
    pub action: CommandKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationProgress {
    pub fn new(command: &Command) -> Self {
        Self {
            action: command.kind(),
            path: command.path().map(str::to_string),
            status: OperationStatus::Pending,
            error: None,
        }
    }

    /// Pending -> Running
    pub fn start(&mut self) -> bool {
        if self.status != OperationStatus::Pending {
            return false;
        }
        self.status = OperationStatus::Running;
        true
    }

    /// Running -> Completed
    pub fn complete(&mut self) -> bool {
        if self.status != OperationStatus::Running {
            return false;
        }
        self.status = OperationStatus::Completed;
        true
    }

    /// Running -> Failed
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status != OperationStatus::Running {
            return false;
        }
        self.status = OperationStatus::Failed;
        self.error = Some(error.into());
        true
    }

    pub fn is_failed(&self) -> bool {
        self.status == OperationStatus::Failed
    }
}
