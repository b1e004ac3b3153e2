//! # Configuration
//!
//! Storage configuration is loaded with [`confique`] from layered sources.
//!
//! ## Resolution Order
//!
//! 1. **Environment variables**: `GEARKEEP_DATA_DIR`, `GEARKEEP_DEBOUNCE_MS`, etc.
//! 2. **Config file**: `gearkeep.toml` in the OS config directory (via `directories`).
//! 3. **Compiled defaults**: `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Env | Default | Description |
//! |-----|-----|---------|-------------|
//! | `data_dir` | `GEARKEEP_DATA_DIR` | OS data dir | Root of the three stores |
//! | `debounce_ms` | `GEARKEEP_DEBOUNCE_MS` | `500` | Autosave debounce window |
//! | `ceiling_ms` | `GEARKEEP_CEILING_MS` | `5000` | Longest an autosave may be deferred |
//! | `snapshot_interval_secs` | `GEARKEEP_SNAPSHOT_INTERVAL_SECS` | `1800` | Periodic secondary snapshot, `0` disables |

use crate::error::{GearError, Result};
use crate::service::ServiceOptions;
use confique::Config;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "gearkeep.toml";

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Directory holding all stores. Falls back to the OS data directory.
    #[config(env = "GEARKEEP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[config(env = "GEARKEEP_DEBOUNCE_MS", default = 500)]
    pub debounce_ms: u64,

    #[config(env = "GEARKEEP_CEILING_MS", default = 5000)]
    pub ceiling_ms: u64,

    #[config(env = "GEARKEEP_SNAPSHOT_INTERVAL_SECS", default = 1800)]
    pub snapshot_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            debounce_ms: 500,
            ceiling_ms: 5000,
            snapshot_interval_secs: 1800,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "gearkeep")
}

impl StorageConfig {
    /// Load from the environment and the OS config file.
    pub fn load() -> Result<Self> {
        let file = project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE));
        Self::load_from(file.as_deref())
    }

    /// Load from the environment and an explicit config file, if it exists.
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = Self::builder().env();
        if let Some(path) = file {
            tracing::debug!(path = %path.display(), "reading config file");
            builder = builder.file(path);
        }
        Ok(builder.load()?)
    }

    /// The configured data directory, or the OS data directory for gearkeep.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| GearError::Config("no home directory to place data in".to_string()))
    }

    pub fn options(&self) -> ServiceOptions {
        ServiceOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            ceiling: Duration::from_millis(self.ceiling_ms),
            snapshot_interval: (self.snapshot_interval_secs > 0)
                .then(|| Duration::from_secs(self.snapshot_interval_secs)),
        }
    }
}
