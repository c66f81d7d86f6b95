// Configuration persistence for user preferences between runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const CONFIG_DIR: &str = ".config/netproc";
const CONFIG_FILE: &str = "preferences.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortColumn {
    Pid,
    Command,
    BytesRx,
    BytesTx,
}

impl Default for SortColumn {
    fn default() -> Self {
        SortColumn::BytesRx
    }
}

/// Preferences file structure. Everything is optional/defaulted so an
/// older file on disk still loads after new fields are added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    #[serde(default)]
    pub interface: Option<String>,

    #[serde(default)]
    pub resolve_dns: bool,

    #[serde(default)]
    pub sort_column: SortColumn,

    #[serde(default = "default_max_buffered_events")]
    pub max_buffered_events: usize,
}

fn default_interval_seconds() -> u64 {
    1
}

fn default_max_buffered_events() -> usize {
    crate::stats::DEFAULT_PENDING_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            interface: None,
            resolve_dns: false,
            sort_column: SortColumn::default(),
            max_buffered_events: default_max_buffered_events(),
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        let config_dir = PathBuf::from(home).join(CONFIG_DIR);

        fs::create_dir_all(&config_dir)
            .with_context(|| format!("failed to create config directory: {:?}", config_dir))?;

        Ok(config_dir.join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            log::debug!("config file not found, using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {:?}", path))?;
        let config: Config =
            serde_json::from_str(&contents).context("failed to parse config file")?;

        log::info!("loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let contents = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&path, contents)
            .with_context(|| format!("failed to write config file: {:?}", path))?;

        log::info!("saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.interval_seconds = 2;
        config.sort_column = SortColumn::BytesTx;

        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.interval_seconds, 2);
        assert_eq!(deserialized.sort_column, SortColumn::BytesTx);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.interval_seconds, 1);
        assert_eq!(config.max_buffered_events, crate::stats::DEFAULT_PENDING_CAPACITY);
    }
}
