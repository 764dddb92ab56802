//! SQLite-backed telemetry store
//!
//! Local durable stand-in for the realtime database. History keys are the
//! zero-padded AUTOINCREMENT sequence, so key order is insertion order.

use super::{sequence_key, HistoryEntry, TelemetryStore};
use crate::models::{NormalizedRecord, StreamMetadata};
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS current_snapshot (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    payload_json TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    upload_time INTEGER NOT NULL,
    payload_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_upload_time
    ON history(upload_time);

CREATE TABLE IF NOT EXISTS stream_metadata (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    payload_json TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Self::init(conn, &db_path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, label: &str) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if label != ":memory:" && journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .unwrap_or(0);
        info!("💾 SQLite store at {} ({} history entries)", label, count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn parse_key(id: &str) -> Result<i64> {
        id.parse::<i64>()
            .with_context(|| format!("Invalid history key: {}", id))
    }
}

#[async_trait::async_trait]
impl TelemetryStore for SqliteStore {
    async fn set_current(&self, record: &NormalizedRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO current_snapshot (slot, payload_json, updated_at) VALUES (0, ?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET payload_json = excluded.payload_json,
                                             updated_at = excluded.updated_at",
            params![payload, Utc::now().timestamp_millis()],
        )
        .context("Failed to write current snapshot")?;
        Ok(())
    }

    async fn append_history(&self, record: &NormalizedRecord) -> Result<String> {
        let payload = serde_json::to_string(record)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO history (upload_time, payload_json) VALUES (?1, ?2)",
            params![record.upload_time, payload],
        )
        .context("Failed to append history")?;
        Ok(sequence_key(conn.last_insert_rowid() as u64))
    }

    async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT seq, payload_json FROM history ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            let seq: i64 = row.get(0)?;
            let payload: String = row.get(1)?;
            Ok((seq, payload))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (seq, payload) = row?;
            let record = serde_json::from_str(&payload)
                .with_context(|| format!("Corrupt history payload at seq {}", seq))?;
            entries.push(HistoryEntry {
                id: sequence_key(seq as u64),
                record,
            });
        }
        Ok(entries)
    }

    async fn delete_history(&self, id: &str) -> Result<()> {
        let seq = Self::parse_key(id)?;
        let conn = self.conn.lock();
        conn.execute("DELETE FROM history WHERE seq = ?1", params![seq])
            .with_context(|| format!("Failed to delete history entry {}", id))?;
        Ok(())
    }

    async fn set_metadata(&self, metadata: &StreamMetadata) -> Result<()> {
        let payload = serde_json::to_string(metadata)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO stream_metadata (slot, payload_json, updated_at) VALUES (0, ?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET payload_json = excluded.payload_json,
                                             updated_at = excluded.updated_at",
            params![payload, Utc::now().timestamp_millis()],
        )
        .context("Failed to write stream metadata")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

impl SqliteStore {
    pub fn current(&self) -> Result<Option<serde_json::Value>> {
        self.read_slot("SELECT payload_json FROM current_snapshot WHERE slot = 0")
    }

    pub fn metadata(&self) -> Result<Option<serde_json::Value>> {
        self.read_slot("SELECT payload_json FROM stream_metadata WHERE slot = 0")
    }

    fn read_slot(&self, sql: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let payload: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }
}
