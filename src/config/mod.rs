//! Configuration module
//!
//! Handles loading and managing application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::resolver::RUNTIME_DIR_ENV;

/// Environment override for the service watch directory
pub const WATCH_DIR_ENV: &str = "PLUGTEST_WATCH_DIR";

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &["./plugtest.yaml", "./plugtest.yml", "./.plugtest.yaml"];

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory watched by the host-side service
    pub watch_dir: PathBuf,

    /// Seconds to wait for a service response
    pub response_timeout_secs: u64,

    /// Poll interval while waiting, in milliseconds
    pub poll_interval_ms: u64,

    /// Override for the engine runtime library directory
    pub runtime_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let watch_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plugtest")
            .join("watch");

        Self {
            watch_dir,
            response_timeout_secs: 300,
            poll_interval_ms: 500,
            runtime_dir: None,
        }
    }
}

impl AppConfig {
    /// Find a configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        for location in CONFIG_LOCATIONS {
            let path = PathBuf::from(location);
            if path.exists() {
                return Some(path);
            }
        }

        dirs::config_dir()
            .map(|dir| dir.join("plugtest").join("config.yaml"))
            .filter(|path| path.exists())
    }

    /// Load configuration from the default location, falling back to
    /// defaults, then apply environment overrides
    pub fn load_default() -> Result<Self> {
        let config = match Self::find() {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        Ok(config.apply_env())
    }

    /// Load configuration from a file (YAML or JSON by extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env(mut self) -> Self {
        if let Some(dir) = env::var_os(WATCH_DIR_ENV) {
            self.watch_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env::var_os(RUNTIME_DIR_ENV) {
            self.runtime_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
