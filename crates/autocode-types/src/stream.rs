//! Streaming session snapshots and observer events

use crate::{Artifact, Command, OperationProgress};
use serde::{Deserialize, Serialize};

/// Snapshot of a model response while (or after) it streams in
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingResponse {
    pub content: String,
    pub artifacts: Vec<Artifact>,
    pub actions: Vec<Command>,
    pub is_complete: bool,
}

/// Events delivered to the observer of a streaming session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session_id: String,
    },
    Snapshot {
        session_id: String,
        response: StreamingResponse,
    },
    /// A complete artifact appeared in the buffer for the first time
    ArtifactClosed {
        session_id: String,
        artifact_id: String,
        title: String,
    },
    Progress {
        session_id: String,
        /// `None` for standalone actions
        artifact_id: Option<String>,
        progress: OperationProgress,
    },
    /// Transport failure, shown to the user in the chat
    Error {
        session_id: String,
        message: String,
    },
    Cancelled {
        session_id: String,
    },
    Finished {
        session_id: String,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Started { session_id }
            | SessionEvent::Snapshot { session_id, .. }
            | SessionEvent::ArtifactClosed { session_id, .. }
            | SessionEvent::Progress { session_id, .. }
            | SessionEvent::Error { session_id, .. }
            | SessionEvent::Cancelled { session_id }
            | SessionEvent::Finished { session_id } => session_id,
        }
    }
}
