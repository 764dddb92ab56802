//! History Store Adapter
//!
//! The uploader only needs five operations from the remote database:
//! overwrite the current snapshot, append to history, enumerate history,
//! delete one history entry and overwrite the metadata record.
//!
//! Every implementation hands out history keys that sort in insertion order,
//! which the retention manager relies on as its tie-break.

pub mod firebase;
pub mod memory;
pub mod sqlite;

pub use firebase::FirebaseStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::models::{NormalizedRecord, StreamMetadata, UPLOAD_TIME_FIELD};
use anyhow::Result;
use serde_json::Value;

/// One stored history record and its store-assigned key
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub record: Value,
}

impl HistoryEntry {
    /// Retention sort key; entries without one count as oldest.
    pub fn upload_time(&self) -> i64 {
        match self.record.get(UPLOAD_TIME_FIELD) {
            Some(v) => v
                .as_i64()
                .or_else(|| v.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            None => 0,
        }
    }
}

#[async_trait::async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Overwrite the single current snapshot.
    async fn set_current(&self, record: &NormalizedRecord) -> Result<()>;

    /// Append to history, returning the new entry's key.
    async fn append_history(&self, record: &NormalizedRecord) -> Result<String>;

    /// All history entries in key order.
    async fn list_history(&self) -> Result<Vec<HistoryEntry>>;

    async fn delete_history(&self, id: &str) -> Result<()>;

    /// Overwrite the stream metadata record.
    async fn set_metadata(&self, metadata: &StreamMetadata) -> Result<()>;

    /// Store identifier for logging/diagnostics.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Key for the n-th appended entry; zero padding keeps lexical order == insertion order.
pub(crate) fn sequence_key(seq: u64) -> String {
    format!("{:020}", seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upload_time_defaults_to_zero() {
        let entry = HistoryEntry {
            id: "a".into(),
            record: json!({"Grate_Speed": 1.0}),
        };
        assert_eq!(entry.upload_time(), 0);

        let entry = HistoryEntry {
            id: "b".into(),
            record: json!({"upload_time": 1_700_000_000_123i64}),
        };
        assert_eq!(entry.upload_time(), 1_700_000_000_123);

        let entry = HistoryEntry {
            id: "c".into(),
            record: json!({"upload_time": 99.0}),
        };
        assert_eq!(entry.upload_time(), 99);
    }

    #[test]
    fn sequence_keys_sort_numerically() {
        assert!(sequence_key(9) < sequence_key(10));
        assert!(sequence_key(99) < sequence_key(1000));
    }
}
