//! Configuration management for the CLI

use anyhow::{bail, Context, Result};
use planner_lib::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Snapshot used when `--snapshot` is not given
    pub snapshot_path: Option<PathBuf>,
    /// Default output format
    pub default_format: Option<String>,
    /// Engine overrides, defaults when absent
    #[serde(default)]
    pub engine: Option<EngineConfig>,
}

impl Config {
    /// Load configuration from the user config file, defaults if it is missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to file
    #[allow(dead_code)]
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Snapshot to operate on: the flag wins over the config file
    pub fn snapshot(&self, override_path: Option<&Path>) -> Result<PathBuf> {
        match override_path.or(self.snapshot_path.as_deref()) {
            Some(path) => Ok(path.to_path_buf()),
            None => bail!(
                "No inventory snapshot given; pass --snapshot or set snapshot_path in {}",
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "the config file".to_string())
            ),
        }
    }

    pub fn engine(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("capctl").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.snapshot_path.is_none());
        assert_eq!(config.engine(), EngineConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            snapshot_path: Some(PathBuf::from("/srv/inventory.json")),
            default_format: Some("json".to_string()),
            engine: None,
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.snapshot_path, config.snapshot_path);
        assert_eq!(loaded.default_format.as_deref(), Some("json"));
    }

    #[test]
    fn test_partial_engine_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"engine": {"bulk_top_n": 10}}"#).unwrap();

        let engine = Config::load_from(&path).unwrap().engine();
        assert_eq!(engine.bulk_top_n, 10);
        assert_eq!(engine.min_group_size, EngineConfig::default().min_group_size);
    }

    #[test]
    fn test_snapshot_flag_wins() {
        let config = Config {
            snapshot_path: Some(PathBuf::from("from-config.json")),
            ..Default::default()
        };
        let chosen = config.snapshot(Some(Path::new("from-flag.json"))).unwrap();
        assert_eq!(chosen, PathBuf::from("from-flag.json"));
        assert_eq!(
            config.snapshot(None).unwrap(),
            PathBuf::from("from-config.json")
        );
        assert!(Config::default().snapshot(None).is_err());
    }
}
