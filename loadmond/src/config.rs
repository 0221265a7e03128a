//! Daemon configuration loaded from a TOML file.
//!
//! Every section is optional; omitted values fall back to the defaults
//! below, so an empty file (or no file at all) yields a working daemon.

use crate::thresholds::ThresholdSet;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub thresholds: ThresholdSet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_sample_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Maximum age of samples and events before the sweeper deletes them.
    #[serde(default = "default_window_days")]
    pub window_days: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("loadmon.db")
}

fn default_sample_interval() -> u64 {
    2
}

fn default_window_days() -> u64 {
    5
}

fn default_sweep_interval() -> u64 {
    86_400
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sample_interval(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config
            .thresholds
            .validate()
            .map_err(|err| anyhow::anyhow!("invalid [thresholds] section: {err}"))?;
        Ok(config)
    }

    pub fn retention_window_secs(&self) -> u64 {
        self.retention.window_days * 86_400
    }
}
