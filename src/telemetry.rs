//! Process-wide logging
//!
//! One tracing subscriber per process: stdout always, plus an append-only
//! log file when requested. Call [`init`] before the first log line and
//! [`LogHandle::shutdown`] on the way out.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "cement_uploader=info";

/// Append-mode log file shared by the file layer and the shutdown handle
#[derive(Clone)]
pub struct SharedFile(Arc<Mutex<File>>);

impl SharedFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        Ok(Self(Arc::new(Mutex::new(file))))
    }

    fn sync(&self) -> std::io::Result<()> {
        let mut file = self.0.lock();
        file.flush()?;
        file.sync_all()
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = SharedFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Keeps the log file alive until shutdown
#[must_use = "dropping the handle skips the final log flush"]
pub struct LogHandle {
    file: Option<SharedFile>,
}

impl LogHandle {
    pub fn shutdown(self) {
        if let Some(file) = self.file {
            if let Err(e) = file.sync() {
                eprintln!("failed to flush log file: {}", e);
            }
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides [`DEFAULT_FILTER`].
pub fn init(log_file: Option<&Path>) -> Result<LogHandle> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let file = log_file.map(SharedFile::open).transpose()?;
    let file_layer = file.clone().map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogHandle { file })
}
