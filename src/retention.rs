//! Retention Manager
//!
//! Keeps the history at or below a fixed cap by deleting the oldest entries
//! after each append. Oldest means smallest `upload_time`; entries sharing an
//! `upload_time` are ordered by store key, which every store issues in
//! insertion order.
//!
//! The check rescans the whole history on every tick. That is fine at the
//! default cap of 1000 with ticks seconds apart.

use crate::error::RetentionError;
use crate::store::{HistoryEntry, TelemetryStore};
use tracing::{debug, info, warn};

pub const DEFAULT_HISTORY_CAP: usize = 1000;

/// Keys of the entries that must go so that at most `max_size` remain.
pub fn select_evictions(entries: &[HistoryEntry], max_size: usize) -> Vec<String> {
    if entries.len() <= max_size {
        return Vec::new();
    }

    let mut ordered: Vec<&HistoryEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| {
        a.upload_time()
            .cmp(&b.upload_time())
            .then_with(|| a.id.cmp(&b.id))
    });

    let excess = entries.len() - max_size;
    ordered
        .into_iter()
        .take(excess)
        .map(|e| e.id.clone())
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionManager {
    max_size: usize,
}

impl Default for RetentionManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl RetentionManager {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Trim the history to the cap. Returns how many entries were removed.
    ///
    /// Every eviction is attempted even if some deletes fail; the error then
    /// reports how many did.
    pub async fn enforce(&self, store: &dyn TelemetryStore) -> Result<usize, RetentionError> {
        let entries = store.list_history().await.map_err(RetentionError::List)?;
        let evictions = select_evictions(&entries, self.max_size);
        if evictions.is_empty() {
            debug!(count = entries.len(), cap = self.max_size, "history within cap");
            return Ok(0);
        }

        let attempted = evictions.len();
        let mut failed = 0usize;
        let mut last_error = None;
        for id in &evictions {
            if let Err(e) = store.delete_history(id).await {
                warn!(key = %id, error = %e, "failed to delete history entry");
                failed += 1;
                last_error = Some(e);
            }
        }

        let removed = attempted - failed;
        if removed > 0 {
            info!("🧹 Cleaned {} old records from history", removed);
        }

        match last_error {
            Some(source) => Err(RetentionError::Delete {
                failed,
                attempted,
                source,
            }),
            None => Ok(removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{FailPoint, MemoryStore};
    use serde_json::json;

    fn entry(id: &str, upload_time: Option<i64>) -> HistoryEntry {
        let record = match upload_time {
            Some(t) => json!({ "upload_time": t }),
            None => json!({ "Grate_Speed": 1.0 }),
        };
        HistoryEntry {
            id: id.to_string(),
            record,
        }
    }

    #[test]
    fn nothing_to_evict_within_cap() {
        let entries = vec![entry("a", Some(1)), entry("b", Some(2))];
        assert!(select_evictions(&entries, 2).is_empty());
        assert!(select_evictions(&[], 0).is_empty());
    }

    #[test]
    fn evicts_smallest_upload_times_regardless_of_key_order() {
        let entries = vec![
            entry("k1", Some(300)),
            entry("k2", Some(100)),
            entry("k3", Some(400)),
            entry("k4", Some(200)),
        ];
        assert_eq!(select_evictions(&entries, 2), vec!["k2", "k4"]);
    }

    #[test]
    fn missing_upload_time_is_oldest() {
        let entries = vec![entry("k1", Some(5)), entry("k2", None), entry("k3", Some(6))];
        assert_eq!(select_evictions(&entries, 2), vec!["k2"]);
    }

    #[test]
    fn ties_break_on_key() {
        let entries = vec![
            entry("k3", Some(10)),
            entry("k1", Some(10)),
            entry("k2", Some(10)),
        ];
        assert_eq!(select_evictions(&entries, 1), vec!["k1", "k2"]);
    }

    #[test]
    fn cap_of_zero_evicts_everything() {
        let entries = vec![entry("a", Some(1)), entry("b", Some(2))];
        assert_eq!(select_evictions(&entries, 0).len(), 2);
    }

    #[tokio::test]
    async fn enforce_keeps_newest_entries() {
        let store = MemoryStore::new();
        for (i, t) in [50, 10, 40, 20, 30].iter().enumerate() {
            store.insert_history_raw(format!("key{}", i), json!({ "upload_time": t }));
        }

        let removed = RetentionManager::new(3).enforce(&store).await.unwrap();
        assert_eq!(removed, 2);

        let mut survivors: Vec<i64> = store
            .history_records()
            .iter()
            .map(|r| r["upload_time"].as_i64().unwrap())
            .collect();
        survivors.sort();
        assert_eq!(survivors, vec![30, 40, 50]);
    }

    #[tokio::test]
    async fn enforce_reports_failures() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store.insert_history_raw(format!("key{}", i), json!({ "upload_time": i }));
        }

        store.set_failing(FailPoint::DeleteHistory, true);
        match RetentionManager::new(2).enforce(&store).await {
            Err(RetentionError::Delete {
                failed, attempted, ..
            }) => {
                assert_eq!(failed, 2);
                assert_eq!(attempted, 2);
            }
            other => panic!("expected delete failure, got {:?}", other),
        }
        assert_eq!(store.history_len(), 4);

        store.set_failing(FailPoint::DeleteHistory, false);
        store.set_failing(FailPoint::ListHistory, true);
        assert!(matches!(
            RetentionManager::new(2).enforce(&store).await,
            Err(RetentionError::List(_))
        ));
    }
}
