//! Engine configuration
//!
//! Loaded from an optional `autocode.toml` in the workspace root, then
//! overridden by `AUTOCODE_*` environment variables. Nested keys use `__`,
//! e.g. `AUTOCODE_MODEL__ENDPOINT` or `AUTOCODE_EXECUTION__ACTION_DELAY_MS`.

use crate::validator::Validator;
use crate::watcher::DEFAULT_IGNORE;
use crate::{AutocodeError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "autocode.toml";

const ENV_PREFIX: &str = "AUTOCODE";

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a coding assistant working inside a project workspace.
Group related file changes in an artifact:

<autoArtifact id="short-id" title="What this does">
  <autoAction type="file" filePath="relative/path.ext">full file content</autoAction>
  <autoAction type="shell">command to run</autoAction>
</autoArtifact>

Paths are relative to the workspace root. Always emit complete file contents."#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub workspace: WorkspaceConfig,
    pub execution: ExecutionConfig,
    pub model: ModelConfig,
    pub sync: SyncConfig,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub id: String,
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Pause between consecutive actions of a batch
    pub action_delay_ms: u64,
    pub sanitize_content: bool,
    /// Extra shell patterns (regex) to reject on top of the built-in list
    pub shell_denylist: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            action_delay_ms: 0,
            sanitize_content: true,
            shell_denylist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            system_prompt: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// WebSocket URL of the sync server; sync is off when unset
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub debounce_ms: u64,
    pub ignore: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    /// Load `autocode.toml` from `root` (if present) and the environment
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_with(root, environment())
    }

    fn load_with(root: &Path, env: Environment) -> Result<Self> {
        let file = root.join(CONFIG_FILE_NAME);
        let mut config: EngineConfig = Config::builder()
            .add_source(File::from(file).format(FileFormat::Toml).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;

        if config.workspace.root.is_relative() {
            config.workspace.root = root.join(&config.workspace.root);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workspace.id.trim().is_empty() {
            return Err(AutocodeError::InvalidConfig(
                "workspace.id must not be empty".into(),
            ));
        }
        if let Some(t) = self.model.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(AutocodeError::InvalidConfig(format!(
                    "model.temperature must be between 0 and 2, got {}",
                    t
                )));
            }
        }
        if let Some(url) = &self.sync.url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(AutocodeError::InvalidConfig(format!(
                    "sync.url must be a ws:// or wss:// URL, got {}",
                    url
                )));
            }
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validator built from the execution section
    pub fn validator(&self) -> Result<Validator> {
        Validator::new()
            .with_sanitize(self.execution.sanitize_content)
            .with_denylist(&self.execution.shell_denylist)
    }

    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.execution.action_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watcher.debounce_ms)
    }

    pub fn system_prompt(&self) -> &str {
        self.model
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("execution.shell_denylist")
        .with_list_parse_key("watcher.ignore")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_with(dir.path(), env(&[])).unwrap();
        assert_eq!(config.workspace.id, "default");
        assert_eq!(config.workspace.root, dir.path().join("."));
        assert_eq!(config.watcher.debounce_ms, 300);
        assert_eq!(config.action_delay(), Duration::ZERO);
        assert!(config.execution.sanitize_content);
        assert!(config.sync.url.is_none());
        assert_eq!(config.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_file_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
[workspace]
id = "demo"

[execution]
action_delay_ms = 25
shell_denylist = ["^curl "]

[model]
model = "local-model"
temperature = 0.2
"#,
        )
        .unwrap();

        let config = EngineConfig::load_with(
            dir.path(),
            env(&[
                ("AUTOCODE_MODEL__ENDPOINT", "http://localhost:8080/v1"),
                ("AUTOCODE_SYNC__URL", "ws://localhost:16790/ws"),
            ]),
        )
        .unwrap();

        assert_eq!(config.workspace.id, "demo");
        assert_eq!(config.action_delay(), Duration::from_millis(25));
        assert_eq!(config.model.model, "local-model");
        assert_eq!(config.model.endpoint, "http://localhost:8080/v1");
        assert_eq!(config.sync.url.as_deref(), Some("ws://localhost:16790/ws"));

        let validator = config.validator().unwrap();
        assert!(validator.check_shell("curl example.com").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            EngineConfig::load_with(dir.path(), env(&[("AUTOCODE_SYNC__URL", "http://x")]));
        assert!(matches!(result, Err(AutocodeError::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.model.temperature = Some(3.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_output_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.workspace.id = "written".into();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            config.to_toml_string().unwrap(),
        )
        .unwrap();

        let loaded = EngineConfig::load_with(dir.path(), env(&[])).unwrap();
        assert_eq!(loaded.workspace.id, "written");
        assert_eq!(loaded.watcher, config.watcher);
    }
}
