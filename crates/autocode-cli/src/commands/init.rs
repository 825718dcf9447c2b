//! Init command - write a default autocode.toml

use anyhow::Result;
use autocode_core::config::CONFIG_FILE_NAME;
use autocode_core::EngineConfig;
use colored::Colorize;
use std::path::Path;

pub async fn run(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            "⚠️".yellow(),
            config_path.display()
        );
        return Ok(());
    }

    tokio::fs::create_dir_all(dir).await?;
    let mut config = EngineConfig::default();
    config.workspace.id = workspace_id_for(dir);
    tokio::fs::write(&config_path, config.to_toml_string()?).await?;

    println!("{} Wrote {}", "✅".green(), config_path.display());
    println!("  Workspace id: {}", config.workspace.id.cyan());
    println!(
        "  Set {} (or edit [model]) before running {}",
        config.model.api_key_env.yellow(),
        "autocode run".cyan()
    );
    Ok(())
}

/// Lowercase, hyphenated directory name
fn workspace_id_for(dir: &Path) -> String {
    let name = dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "workspace".to_string());
    name.to_lowercase().replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_writes_loadable_config() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("My Project");

        run(&dir, false).await.unwrap();

        let config = crate::commands::load_config(&dir).unwrap();
        assert_eq!(config.workspace.id, "my-project");
    }

    #[tokio::test]
    async fn test_init_keeps_existing_config() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[workspace]\nid = \"keep\"\n").unwrap();

        run(temp.path(), false).await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("keep"));

        run(temp.path(), true).await.unwrap();
        assert!(!std::fs::read_to_string(&path).unwrap().contains("keep"));
    }
}
