//! Artifact types

use crate::Command;
use serde::{Deserialize, Serialize};

/// A named, ordered group of commands emitted together for one logical change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actions: Vec<Command>,
}

impl Artifact {
    pub fn new(id: impl Into<String>, title: impl Into<String>, actions: Vec<Command>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            actions,
        }
    }

    /// Paths touched by the file actions of this artifact, in order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().filter_map(|a| a.path())
    }
}
