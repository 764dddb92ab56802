//! Uploader configuration
//!
//! Values come from (lowest to highest precedence): built-in defaults, an
//! optional TOML file, then environment / command-line flags applied by the
//! binary.

use crate::error::ConfigurationError;
use crate::replay::ReplayConfig;
use crate::retention::DEFAULT_HISTORY_CAP;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Firebase,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    #[serde(default)]
    pub store: StoreBackend,

    /// Firebase Realtime Database URL
    #[serde(default)]
    pub database_url: Option<String>,

    /// Database secret / ID token passed as the `auth` query parameter
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    /// JSON / JSON Lines dataset to replay
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    /// Replay generated readings instead of a data file
    #[serde(default)]
    pub synthetic_rows: Option<usize>,

    #[serde(default = "default_synthetic_seed")]
    pub synthetic_seed: u64,

    #[serde(default = "default_history_max_size")]
    pub history_max_size: usize,

    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("cement_plant_data.db")
}

fn default_synthetic_seed() -> u64 {
    42
}

fn default_history_max_size() -> usize {
    DEFAULT_HISTORY_CAP
}

fn default_update_interval_secs() -> u64 {
    5
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::default(),
            database_url: None,
            auth_token: None,
            sqlite_path: default_sqlite_path(),
            data_file: None,
            synthetic_rows: None,
            synthetic_seed: default_synthetic_seed(),
            history_max_size: default_history_max_size(),
            update_interval_secs: default_update_interval_secs(),
        }
    }
}

impl UploaderConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        toml::from_str(&contents).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check everything needed to start a replay against the store.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.store == StoreBackend::Firebase {
            let url = self
                .database_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or(ConfigurationError::MissingDatabaseUrl)?;
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ConfigurationError::InvalidDatabaseUrl {
                    url: url.to_string(),
                });
            }
        }

        match (&self.data_file, self.synthetic_rows) {
            (Some(path), _) if !path.exists() => {
                return Err(ConfigurationError::DataSourceNotFound(path.clone()))
            }
            (None, None) => return Err(ConfigurationError::MissingDataSource),
            (None, Some(0)) => {
                return Err(ConfigurationError::InvalidSetting {
                    name: "synthetic_rows",
                    reason: "must be at least 1".to_string(),
                })
            }
            _ => {}
        }

        if self.history_max_size == 0 {
            return Err(ConfigurationError::InvalidSetting {
                name: "history_max_size",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.update_interval_secs == 0 {
            return Err(ConfigurationError::InvalidSetting {
                name: "update_interval_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn replay_config(&self, loop_enabled: bool) -> ReplayConfig {
        ReplayConfig {
            loop_enabled,
            update_interval: self.update_interval(),
            history_max_size: self.history_max_size,
        }
    }
}
