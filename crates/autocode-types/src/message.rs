//! WebSocket message protocol for the workspace sync channel

use crate::FileSyncEvent;
use serde::{Deserialize, Serialize};

/// Client -> Server messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a workspace group, leaving any previous one
    Join { workspace_id: String },
    Leave { workspace_id: String },
    Publish { event: FileSyncEvent },

    // Heartbeat
    Ping,
}

/// Server -> Client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Joined {
        workspace_id: String,
        client_id: String,
        members: usize,
    },
    Left {
        workspace_id: String,
    },
    /// An event published by another member of the workspace
    FileEvent {
        event: FileSyncEvent,
    },
    /// Acknowledges a publish with the number of members it was delivered to
    Published {
        path: String,
        delivered: usize,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_tags() {
        let msg = ClientMessage::Join {
            workspace_id: "ws-1".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"join","workspace_id":"ws-1"}"#);

        let pong: ServerMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(pong, ServerMessage::Pong));
    }
}
