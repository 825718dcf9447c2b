//! Autocode Core Library
//!
//! The streaming action protocol engine: recognizes tag-delimited commands in
//! a growing model response, validates and applies them to a workspace, and
//! broadcasts the resulting file changes to every workspace participant.

// Re-export pure types from autocode-types
pub use autocode_types::*;

pub mod config;
pub mod editor;
pub mod error;
pub mod executor;
pub mod parser;
pub mod ports;
pub mod runner;
pub mod session;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod validator;
pub mod watcher;

pub use config::EngineConfig;
pub use error::{AutocodeError, Result};
pub use executor::{ActionExecutor, ActionOutcome, RecentWrites};
pub use parser::{
    parse_actions, parse_artifacts, parse_response, parse_standalone_actions, ParsedResponse,
};
pub use runner::ArtifactRunner;
pub use session::{SessionController, SessionOutcome};
pub use validator::{ValidationError, Validator};
