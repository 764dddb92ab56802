//! Cement Plant Telemetry Uploader
//!
//! Replays plant sensor readings into a realtime database on a fixed
//! cadence, keeping a bounded rolling history and a status side-channel.

pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod replay;
pub mod retention;
pub mod source;
pub mod store;
pub mod telemetry;

pub use config::{StoreBackend, UploaderConfig};
pub use models::{NormalizedRecord, RawRecord, RawValue, StreamMetadata, StreamState, StreamStatus};
pub use normalize::{normalize, Clock, ManualClock, Normalizer, SystemClock};
pub use replay::{ReplayConfig, ReplayPhase, ReplayScheduler, StopHandle};
pub use retention::RetentionManager;
pub use store::{HistoryEntry, TelemetryStore};
