//! File change events broadcast to workspace participants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Who caused a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    Ai,
    User,
    External,
}

impl std::fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeSource::Ai => write!(f, "ai"),
            ChangeSource::User => write!(f, "user"),
            ChangeSource::External => write!(f, "external"),
        }
    }
}

/// A single file mutation, broadcast to the other members of a workspace.
/// Storage stays authoritative; events are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSyncEvent {
    pub kind: FileChangeKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub workspace_id: String,
    pub source: ChangeSource,
    pub timestamp: DateTime<Utc>,
}

impl FileSyncEvent {
    pub fn new(
        kind: FileChangeKind,
        path: impl Into<String>,
        content: Option<String>,
        workspace_id: impl Into<String>,
        source: ChangeSource,
    ) -> Self {
        Self {
            kind,
            path: path.into(),
            content,
            workspace_id: workspace_id.into(),
            source,
            timestamp: Utc::now(),
        }
    }

    /// Receivers auto-open files the model created
    pub fn should_auto_open(&self) -> bool {
        self.source == ChangeSource::Ai && self.kind == FileChangeKind::Created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = FileSyncEvent::new(
            FileChangeKind::Created,
            "src/App.tsx",
            Some("x".to_string()),
            "ws-1",
            ChangeSource::Ai,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "created");
        assert_eq!(json["workspaceId"], "ws-1");
        assert_eq!(json["source"], "ai");
        assert!(event.should_auto_open());

        let back: FileSyncEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
