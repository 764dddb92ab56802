//! In-process store for dry runs and tests

use super::{sequence_key, HistoryEntry, TelemetryStore};
use crate::models::{NormalizedRecord, StreamMetadata};
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Inner {
    current: Option<Value>,
    metadata: Option<Value>,
    history: BTreeMap<String, Value>,
    next_seq: u64,
    writes: u64,
    fail_current: bool,
    fail_appends: bool,
    fail_list: bool,
    fail_deletes: bool,
    fail_metadata: bool,
}

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    SetCurrent,
    AppendHistory,
    ListHistory,
    DeleteHistory,
    SetMetadata,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make one operation fail until cleared.
    pub fn set_failing(&self, point: FailPoint, failing: bool) {
        let mut inner = self.inner.lock();
        match point {
            FailPoint::SetCurrent => inner.fail_current = failing,
            FailPoint::AppendHistory => inner.fail_appends = failing,
            FailPoint::ListHistory => inner.fail_list = failing,
            FailPoint::DeleteHistory => inner.fail_deletes = failing,
            FailPoint::SetMetadata => inner.fail_metadata = failing,
        }
    }

    pub fn current(&self) -> Option<Value> {
        self.inner.lock().current.clone()
    }

    pub fn metadata(&self) -> Option<Value> {
        self.inner.lock().metadata.clone()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// History records in key order.
    pub fn history_records(&self) -> Vec<Value> {
        self.inner.lock().history.values().cloned().collect()
    }

    /// Number of successful mutations of any kind.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    /// Insert a raw history record under an explicit key, bypassing normalization.
    pub fn insert_history_raw(&self, id: impl Into<String>, record: Value) {
        let mut inner = self.inner.lock();
        inner.history.insert(id.into(), record);
    }
}

#[async_trait::async_trait]
impl TelemetryStore for MemoryStore {
    async fn set_current(&self, record: &NormalizedRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_current {
            return Err(anyhow!("set_current failed (injected)"));
        }
        inner.current = Some(record.to_json());
        inner.writes += 1;
        Ok(())
    }

    async fn append_history(&self, record: &NormalizedRecord) -> Result<String> {
        let mut inner = self.inner.lock();
        if inner.fail_appends {
            return Err(anyhow!("append_history failed (injected)"));
        }
        inner.next_seq += 1;
        let id = sequence_key(inner.next_seq);
        inner.history.insert(id.clone(), record.to_json());
        inner.writes += 1;
        Ok(id)
    }

    async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        let inner = self.inner.lock();
        if inner.fail_list {
            return Err(anyhow!("list_history failed (injected)"));
        }
        Ok(inner
            .history
            .iter()
            .map(|(id, record)| HistoryEntry {
                id: id.clone(),
                record: record.clone(),
            })
            .collect())
    }

    async fn delete_history(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_deletes {
            return Err(anyhow!("delete_history({}) failed (injected)", id));
        }
        // Deleting an absent key is not an error, matching the remote store.
        if inner.history.remove(id).is_some() {
            inner.writes += 1;
        }
        Ok(())
    }

    async fn set_metadata(&self, metadata: &StreamMetadata) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_metadata {
            return Err(anyhow!("set_metadata failed (injected)"));
        }
        inner.metadata = Some(serde_json::to_value(metadata)?);
        inner.writes += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
