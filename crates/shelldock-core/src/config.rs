//! Configuration management for shelldock

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::platform;

/// Overrides the configured platform for a single invocation
pub const PLATFORM_ENV: &str = "SHELLDOCK_PLATFORM";

/// When the search index is rebuilt after the store changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexRebuild {
    /// Rebuild before answering a query
    #[default]
    Inline,
    /// Answer from the stale index and rebuild on a worker thread
    Background,
}

/// Global shelldock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Platform used to pick command variants ("auto" detects it)
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Shell used to launch resolved commands
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Ask before running a command
    #[serde(default = "default_confirm")]
    pub confirm: bool,

    /// Index rebuild strategy
    #[serde(default)]
    pub index_rebuild: IndexRebuild,
}

fn default_platform() -> String {
    "auto".to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_confirm() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            shell: default_shell(),
            confirm: default_confirm(),
            index_rebuild: IndexRebuild::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Platform commands are resolved for.
    ///
    /// `SHELLDOCK_PLATFORM` wins over the file; "auto" or an empty value
    /// falls through to detection.
    pub fn active_platform(&self) -> String {
        let configured = std::env::var(PLATFORM_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.platform.clone());

        match configured.trim() {
            "" | "auto" => platform::detect(),
            other => other.to_lowercase(),
        }
    }

    /// Set a key from the CLI
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "platform" => self.platform = value.trim().to_lowercase(),
            "shell" => {
                if value.trim().is_empty() {
                    bail!("shell cannot be empty");
                }
                self.shell = value.trim().to_string();
            }
            "confirm" => {
                self.confirm = match value {
                    "true" | "yes" | "on" => true,
                    "false" | "no" | "off" => false,
                    _ => bail!("confirm expects true or false, got '{}'", value),
                }
            }
            "index_rebuild" => {
                self.index_rebuild = match value {
                    "inline" => IndexRebuild::Inline,
                    "background" => IndexRebuild::Background,
                    _ => bail!("index_rebuild expects inline or background, got '{}'", value),
                }
            }
            _ => bail!("Unknown config key: {}", key),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let tmp = TempDir::new()?;
        let config = Config::load(&tmp.path().join("config.json"))?;
        assert_eq!(config.platform, "auto");
        assert_eq!(config.shell, "sh");
        assert!(config.confirm);
        assert_eq!(config.index_rebuild, IndexRebuild::Inline);
        Ok(())
    }

    #[test]
    fn test_partial_file_and_unknown_keys() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"platform": "arch", "theme": "dark"}"#)?;

        let config = Config::load(&path)?;
        assert_eq!(config.platform, "arch");
        assert_eq!(config.shell, "sh");
        Ok(())
    }

    #[test]
    fn test_save_and_reload() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.set("platform", "Ubuntu")?;
        config.set("confirm", "no")?;
        config.set("index_rebuild", "background")?;
        config.save(&path)?;

        let loaded = Config::load(&path)?;
        assert_eq!(loaded.platform, "ubuntu");
        assert!(!loaded.confirm);
        assert_eq!(loaded.index_rebuild, IndexRebuild::Background);
        Ok(())
    }

    #[test]
    fn test_set_rejects_unknown_key() {
        let mut config = Config::default();
        assert!(config.set("colour", "blue").is_err());
        assert!(config.set("confirm", "maybe").is_err());
    }
}
