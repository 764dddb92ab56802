//! Replay Scheduler
//!
//! Walks the pre-loaded record sequence one record per tick:
//! normalize → publish current → append history → trim history →
//! publish metadata → advance. Ticks are strictly sequential and the wait
//! between them is measured from the end of one tick's work, so slow store
//! calls delay ticks but never cause one to be skipped.
//!
//! Stop requests are observed at tick boundaries only.

pub mod metadata;

pub use metadata::MetadataPublisher;

use crate::error::UploadError;
use crate::models::{NormalizedRecord, RawRecord, StreamState, StreamStatus};
use crate::normalize::{Clock, Normalizer};
use crate::retention::{RetentionManager, DEFAULT_HISTORY_CAP};
use crate::store::TelemetryStore;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPhase {
    Idle,
    Running,
    Completed,
    Stopped,
}

impl ReplayPhase {
    pub fn is_finished(&self) -> bool {
        matches!(self, ReplayPhase::Completed | ReplayPhase::Stopped)
    }
}

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Wrap to the first record after the last one
    pub loop_enabled: bool,
    /// Pause between the end of one tick and the start of the next
    pub update_interval: Duration,
    /// Retention cap for the history
    pub history_max_size: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            loop_enabled: true,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            history_max_size: DEFAULT_HISTORY_CAP,
        }
    }
}

/// Cloneable handle used to request a stop (e.g. from a Ctrl-C task)
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// What one tick did
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub index: usize,
    pub uploaded: bool,
    pub evicted: usize,
    pub metadata_published: bool,
}

pub struct ReplayScheduler {
    records: Vec<RawRecord>,
    store: Arc<dyn TelemetryStore>,
    normalizer: Normalizer,
    retention: RetentionManager,
    metadata: MetadataPublisher,
    update_interval: Duration,
    state: StreamState,
    /// Index of the record the latest tick published
    last_published: Option<usize>,
    phase: ReplayPhase,
    ticks: u64,
    stop: StopHandle,
}

impl ReplayScheduler {
    pub fn new(
        config: ReplayConfig,
        records: Vec<RawRecord>,
        store: Arc<dyn TelemetryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = StreamState::new(records.len(), config.loop_enabled);
        Self {
            records,
            store,
            normalizer: Normalizer::new(clock),
            retention: RetentionManager::new(config.history_max_size),
            metadata: MetadataPublisher::new(config.update_interval.as_secs()),
            update_interval: config.update_interval,
            state,
            last_published: None,
            phase: ReplayPhase::Idle,
            ticks: 0,
            stop: StopHandle::default(),
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn phase(&self) -> ReplayPhase {
        self.phase
    }

    /// Ticks executed so far in this run.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Execute one tick. No-op once the scheduler has finished.
    pub async fn tick(&mut self) -> Option<TickReport> {
        match self.phase {
            ReplayPhase::Completed | ReplayPhase::Stopped => return None,
            ReplayPhase::Idle => self.start(),
            ReplayPhase::Running => {}
        }

        if self.records.is_empty() {
            info!("✅ No records to upload");
            self.finish(ReplayPhase::Completed);
            return None;
        }

        let index = self.state.current_index;
        let record = self.normalizer.normalize(&self.records[index]);

        let (uploaded, evicted) = match self.publish(&record).await {
            Ok(evicted) => {
                info!(
                    index,
                    "📡 Uploaded data point - Clinker Inlet: {}°C",
                    inlet_label(&record)
                );
                (true, evicted)
            }
            Err(e) => {
                error!(index, error = ?anyhow::Error::from(e), "❌ Upload failed");
                (false, 0)
            }
        };

        info!(
            "📈 Progress: {:.1}% ({}/{})",
            self.state.progress_percent(),
            index + 1,
            self.state.total_records
        );

        self.last_published = Some(index);
        let metadata_published = self.publish_metadata().await;

        self.ticks += 1;
        self.advance();

        Some(TickReport {
            index,
            uploaded,
            evicted,
            metadata_published,
        })
    }

    /// Tick until the sequence completes or a stop is requested.
    pub async fn run(&mut self) -> ReplayPhase {
        info!(
            "🚀 Starting real-time data streaming ({}-second intervals)",
            self.update_interval.as_secs()
        );
        info!("📊 Total records available: {}", self.state.total_records);

        while !self.phase.is_finished() {
            if self.stop.is_stop_requested() {
                info!("⏹️ Streaming stopped by user");
                self.finish(ReplayPhase::Stopped);
                break;
            }

            let started = Instant::now();
            self.tick().await;
            debug!(elapsed_ms = started.elapsed().as_millis() as u64, "tick finished");

            if self.phase.is_finished() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.update_interval) => {}
                _ = self.stop.wake.notified() => {}
            }
        }

        if self.last_published.is_some() {
            self.publish_metadata().await;
        }
        self.phase
    }

    /// Upload one record out of band. Does not touch the stream state.
    pub async fn upload_single(&self, index: usize) -> Result<NormalizedRecord, UploadError> {
        let total = self.records.len();
        if index >= total {
            return Err(UploadError::IndexOutOfRange { index, total });
        }

        let record = self.normalizer.normalize(&self.records[index]);
        self.publish(&record).await?;
        info!("✅ Single record uploaded: Index {}", index);
        Ok(record)
    }

    fn start(&mut self) {
        self.phase = ReplayPhase::Running;
        self.state.status = StreamStatus::Active;
    }

    fn finish(&mut self, phase: ReplayPhase) {
        self.phase = phase;
        self.state.status = StreamStatus::Stopped;
    }

    fn advance(&mut self) {
        self.state.current_index += 1;
        if self.state.current_index < self.state.total_records {
            return;
        }

        if self.state.loop_enabled {
            info!("🔄 Reached end of data, looping back to start");
            self.state.current_index = 0;
        } else {
            info!("✅ Finished uploading all data records");
            // Leave the index on the last published record.
            self.state.current_index = self.state.total_records - 1;
            self.finish(ReplayPhase::Completed);
        }
    }

    /// current → history → retention. Retention failures are logged only.
    async fn publish(&self, record: &NormalizedRecord) -> Result<usize, UploadError> {
        self.store
            .set_current(record)
            .await
            .map_err(UploadError::Current)?;
        self.store
            .append_history(record)
            .await
            .map_err(UploadError::History)?;

        match self.retention.enforce(self.store.as_ref()).await {
            Ok(evicted) => Ok(evicted),
            Err(e) => {
                warn!(error = ?anyhow::Error::from(e), "⚠️ History cleanup failed");
                Ok(0)
            }
        }
    }

    /// Reports the last published record, not the next one to go out.
    async fn publish_metadata(&self) -> bool {
        let mut state = self.state.clone();
        if let Some(index) = self.last_published {
            state.current_index = index;
        }
        let now = self.normalizer.now();
        match self
            .metadata
            .publish(self.store.as_ref(), &state, now)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(error = ?anyhow::Error::from(e), "⚠️ Metadata update failed");
                false
            }
        }
    }
}

fn inlet_label(record: &NormalizedRecord) -> String {
    match record.number("Clinker_Inlet_Temp") {
        Some(v) => format!("{:.1}", v),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ManualClock;
    use crate::store::memory::{FailPoint, MemoryStore};

    fn rows(n: usize) -> Vec<RawRecord> {
        (0..n)
            .map(|i| {
                RawRecord::new()
                    .with("Time", format!("row-{}", i).as_str())
                    .with("Clinker_Inlet_Temp", 1300.0 + i as f64)
            })
            .collect()
    }

    fn scheduler(n: usize, config: ReplayConfig) -> (ReplayScheduler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000, 5_000));
        let sched = ReplayScheduler::new(config, rows(n), store.clone(), clock);
        (sched, store)
    }

    fn looping(cap: usize) -> ReplayConfig {
        ReplayConfig {
            loop_enabled: true,
            update_interval: Duration::ZERO,
            history_max_size: cap,
        }
    }

    fn one_pass() -> ReplayConfig {
        ReplayConfig {
            loop_enabled: false,
            update_interval: Duration::ZERO,
            history_max_size: 1000,
        }
    }

    #[tokio::test]
    async fn looping_index_wraps() {
        let n = 3;
        let (mut sched, _store) = scheduler(n, looping(1000));
        for ticks in 1..=(3 * n + 2) {
            sched.tick().await.unwrap();
            assert_eq!(sched.state().current_index, ticks % n);
            assert_eq!(sched.phase(), ReplayPhase::Running);
        }
    }

    #[tokio::test]
    async fn single_pass_completes_after_n_ticks() {
        let (mut sched, store) = scheduler(3, one_pass());
        for _ in 0..3 {
            assert!(sched.tick().await.is_some());
        }
        assert_eq!(sched.phase(), ReplayPhase::Completed);
        assert_eq!(sched.state().status, StreamStatus::Stopped);
        assert!(sched.tick().await.is_none());
        assert_eq!(store.history_len(), 3);
        assert_eq!(sched.ticks(), 3);
    }

    #[tokio::test]
    async fn tick_publishes_current_history_and_metadata() {
        let (mut sched, store) = scheduler(2, looping(1000));
        let report = sched.tick().await.unwrap();
        assert_eq!(
            report,
            TickReport {
                index: 0,
                uploaded: true,
                evicted: 0,
                metadata_published: true
            }
        );

        let current = store.current().unwrap();
        assert_eq!(current["Clinker_Inlet_Temp"], 1300.0);
        assert!(current.get("Time").is_none());

        let meta = store.metadata().unwrap();
        assert_eq!(meta["current_index"], 0);
        assert_eq!(meta["total_records"], 2);
        assert_eq!(meta["status"], "active");
        assert_eq!(meta["update_interval_seconds"], 0);
    }

    #[tokio::test]
    async fn upload_failure_does_not_stop_the_loop() {
        let (mut sched, store) = scheduler(3, looping(1000));
        store.set_failing(FailPoint::SetCurrent, true);
        let report = sched.tick().await.unwrap();
        assert!(!report.uploaded);
        assert!(report.metadata_published);
        assert_eq!(store.history_len(), 0);
        assert_eq!(sched.state().current_index, 1);

        store.set_failing(FailPoint::SetCurrent, false);
        let report = sched.tick().await.unwrap();
        assert!(report.uploaded);
        assert_eq!(store.history_len(), 1);
    }

    #[tokio::test]
    async fn retention_and_metadata_failures_are_swallowed() {
        let (mut sched, store) = scheduler(3, looping(1));
        store.set_failing(FailPoint::DeleteHistory, true);
        store.set_failing(FailPoint::SetMetadata, true);

        sched.tick().await.unwrap();
        let report = sched.tick().await.unwrap();
        assert!(report.uploaded);
        assert!(!report.metadata_published);
        // Cap temporarily exceeded while deletes fail
        assert_eq!(store.history_len(), 2);

        store.set_failing(FailPoint::DeleteHistory, false);
        let report = sched.tick().await.unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(store.history_len(), 1);
    }

    #[tokio::test]
    async fn upload_single_leaves_state_alone() {
        let (mut sched, store) = scheduler(3, looping(1000));
        sched.tick().await.unwrap();
        let before = sched.state().clone();

        let record = sched.upload_single(1).await.unwrap();
        assert_eq!(record.number("Clinker_Inlet_Temp"), Some(1301.0));
        assert_eq!(sched.state(), &before);
        assert_eq!(store.current().unwrap()["Clinker_Inlet_Temp"], 1301.0);
        assert_eq!(store.history_len(), 2);
    }

    #[tokio::test]
    async fn upload_single_rejects_out_of_range() {
        let (sched, store) = scheduler(3, looping(1000));
        match sched.upload_single(99).await {
            Err(UploadError::IndexOutOfRange { index, total }) => {
                assert_eq!(index, 99);
                assert_eq!(total, 3);
            }
            other => panic!("expected index error, got {:?}", other),
        }
        assert_eq!(store.write_count(), 0);
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn run_single_pass_ends_completed() {
        let (mut sched, store) = scheduler(4, one_pass());
        assert_eq!(sched.run().await, ReplayPhase::Completed);
        assert_eq!(store.history_len(), 4);
        assert_eq!(store.metadata().unwrap()["status"], "stopped");
        assert_eq!(store.metadata().unwrap()["current_index"], 3);
    }

    #[tokio::test]
    async fn stop_requested_before_run_uploads_nothing() {
        let (mut sched, store) = scheduler(4, looping(1000));
        sched.stop_handle().stop();
        assert_eq!(sched.run().await, ReplayPhase::Stopped);
        assert_eq!(store.history_len(), 0);
        assert_eq!(store.write_count(), 0);
        assert!(store.metadata().is_none());
    }

    #[tokio::test]
    async fn stop_after_one_tick_reports_the_published_index() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0, 1_000));
        let config = ReplayConfig {
            loop_enabled: true,
            update_interval: Duration::from_millis(200),
            history_max_size: 1000,
        };
        let mut sched = ReplayScheduler::new(config, rows(3), store.clone(), clock);
        let stop = sched.stop_handle();

        let handle = tokio::spawn(async move {
            let phase = sched.run().await;
            (phase, sched.ticks())
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();

        let (phase, ticks) = handle.await.unwrap();
        assert_eq!(phase, ReplayPhase::Stopped);
        assert_eq!(ticks, 1);
        assert_eq!(store.current().unwrap()["Clinker_Inlet_Temp"], 1300.0);
        let meta = store.metadata().unwrap();
        assert_eq!(meta["current_index"], 0);
        assert_eq!(meta["status"], "stopped");
    }

    #[tokio::test]
    async fn metadata_after_wrap_points_at_last_record() {
        let (mut sched, store) = scheduler(3, looping(1000));
        for _ in 0..3 {
            sched.tick().await.unwrap();
        }
        assert_eq!(sched.state().current_index, 0);
        assert_eq!(store.metadata().unwrap()["current_index"], 2);
    }

    #[tokio::test]
    async fn stop_is_observed_at_tick_boundary() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0, 1_000));
        let config = ReplayConfig {
            loop_enabled: true,
            update_interval: Duration::from_millis(20),
            history_max_size: 1000,
        };
        let mut sched = ReplayScheduler::new(config, rows(2), store.clone(), clock);
        let stop = sched.stop_handle();

        let handle = tokio::spawn(async move {
            let phase = sched.run().await;
            (phase, sched.ticks())
        });
        tokio::time::sleep(Duration::from_millis(70)).await;
        stop.stop();

        let (phase, ticks) = handle.await.unwrap();
        assert_eq!(phase, ReplayPhase::Stopped);
        assert!(ticks >= 1);
        assert_eq!(store.history_len() as u64, ticks);
    }

    #[tokio::test]
    async fn empty_sequence_completes_without_touching_store() {
        let store = Arc::new(MemoryStore::new());
        let mut sched = ReplayScheduler::new(
            one_pass(),
            Vec::new(),
            store.clone(),
            Arc::new(ManualClock::fixed(0)),
        );
        assert!(sched.tick().await.is_none());
        assert_eq!(sched.phase(), ReplayPhase::Completed);
        assert_eq!(store.write_count(), 0);
    }
}
