//! Stream metadata side-channel

use crate::error::MetadataError;
use crate::models::{StreamMetadata, StreamState};
use crate::store::TelemetryStore;
use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, Copy)]
pub struct MetadataPublisher {
    update_interval_seconds: u64,
}

impl MetadataPublisher {
    pub fn new(update_interval_seconds: u64) -> Self {
        Self {
            update_interval_seconds,
        }
    }

    pub fn snapshot(&self, state: &StreamState, now: DateTime<Utc>) -> StreamMetadata {
        StreamMetadata {
            last_update: now.to_rfc3339_opts(SecondsFormat::Micros, true),
            current_index: state.current_index,
            total_records: state.total_records,
            update_interval_seconds: self.update_interval_seconds,
            status: state.status,
        }
    }

    /// Overwrite the metadata record. Callers log the error and move on.
    pub async fn publish(
        &self,
        store: &dyn TelemetryStore,
        state: &StreamState,
        now: DateTime<Utc>,
    ) -> Result<StreamMetadata, MetadataError> {
        let metadata = self.snapshot(state, now);
        store.set_metadata(&metadata).await.map_err(MetadataError)?;
        Ok(metadata)
    }
}
