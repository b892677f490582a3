//! Configuration management for gbtim
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Label recorded on file copies indexed from this machine
    #[serde(default = "default_host")]
    pub host: String,

    /// Indexing configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Read the pointing table (full-data extraction) by default
    #[serde(default = "default_full_data")]
    pub full_data: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            full_data: default_full_data(),
        }
    }
}

/// Resolved filesystem locations
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    pub base_dir: PathBuf,
    pub config_file: PathBuf,
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base_dir = Self::default_base_dir();
        Self {
            host: default_host(),
            index: IndexConfig::default(),
            paths: PathsConfig {
                config_file: base_dir.join("config.toml"),
                db_file: base_dir.join("index.db"),
                base_dir,
            },
        }
    }
}

impl Config {
    /// Default base directory for config and database
    pub fn default_base_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gbtim")
    }

    /// Default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        let base_dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_base_dir);
        config.paths.config_file = path.to_path_buf();
        config.paths.db_file = base_dir.join("index.db");
        config.paths.base_dir = base_dir;

        config.validate()?;
        Ok(config)
    }

    /// Write configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host cannot be empty".to_string()));
        }
        Ok(())
    }
}
