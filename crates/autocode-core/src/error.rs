//! Error types for Autocode

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutocodeError>;

#[derive(Error, Debug)]
pub enum AutocodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Editor error: {0}")]
    Editor(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport aborted")]
    TransportAborted,

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Workspace not joined: {0}")]
    NotJoined(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl AutocodeError {
    /// Cancellation is a clean end of a session, not a fault
    pub fn is_aborted(&self) -> bool {
        matches!(self, AutocodeError::TransportAborted)
    }
}

impl From<serde_json::Error> for AutocodeError {
    fn from(e: serde_json::Error) -> Self {
        AutocodeError::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for AutocodeError {
    fn from(e: config::ConfigError) -> Self {
        AutocodeError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for AutocodeError {
    fn from(e: toml::ser::Error) -> Self {
        AutocodeError::Serialization(e.to_string())
    }
}
