//! Error taxonomy for the uploader
//!
//! Only [`ConfigurationError`] and [`LoadError`] are fatal. Everything raised
//! inside a tick is logged by the scheduler and the replay keeps going.

use std::path::PathBuf;

/// Startup configuration problems
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("FIREBASE_DATABASE_URL is not set (required for the firebase store)")]
    MissingDatabaseUrl,

    #[error("invalid database url {url:?}: expected an http(s) url")]
    InvalidDatabaseUrl { url: String },

    #[error("no data source configured: pass --data-file or --synthetic")]
    MissingDataSource,

    #[error("data file not found: {}", .0.display())]
    DataSourceNotFound(PathBuf),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// The input sequence could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {} (line {line})", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("row {row} is not a JSON object")]
    NotAnObject { row: usize },

    #[error("unsupported data file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("data source contains no records")]
    Empty,
}

/// A store write failed, or a single-record request was rejected
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid index {index}: sequence has {total} records")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("failed to publish current snapshot")]
    Current(#[source] anyhow::Error),

    #[error("failed to append history entry")]
    History(#[source] anyhow::Error),
}

/// History trimming failed; the history may briefly exceed its cap
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("failed to list history")]
    List(#[source] anyhow::Error),

    #[error("failed to delete {failed} of {attempted} expired history entries")]
    Delete {
        failed: usize,
        attempted: usize,
        #[source]
        source: anyhow::Error,
    },
}

/// The status side-channel could not be written
#[derive(Debug, thiserror::Error)]
#[error("failed to publish stream metadata")]
pub struct MetadataError(#[source] pub anyhow::Error);
