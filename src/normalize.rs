//! Record Normalizer
//!
//! Turns one heterogeneous source row into the canonical record shape:
//! missing/NaN readings become `0.0`, numbers become `f64`, anything else is
//! kept as text, and the `timestamp`/`upload_time` pair is injected.

use crate::models::{
    FieldValue, NormalizedRecord, RawRecord, RawValue, UPLOAD_TIME_FIELD,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

/// Source column names that would collide with the injected `timestamp`.
const RESERVED_TIME_FIELDS: [&str; 2] = ["time", "timestamp"];

/// Wall-clock source for normalization and metadata
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock whose readings never move backwards in milliseconds.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_millis: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let millis = now.timestamp_millis();
        let prev = self.last_millis.fetch_max(millis, Ordering::SeqCst);
        if prev > millis {
            DateTime::from_timestamp_millis(prev).unwrap_or(now)
        } else {
            now
        }
    }
}

/// Deterministic clock: every reading advances by a fixed step.
#[derive(Debug)]
pub struct ManualClock {
    next_millis: AtomicI64,
    step_millis: i64,
}

impl ManualClock {
    pub fn new(start_millis: i64, step_millis: i64) -> Self {
        Self {
            next_millis: AtomicI64::new(start_millis),
            step_millis,
        }
    }

    /// Clock frozen at one instant.
    pub fn fixed(millis: i64) -> Self {
        Self::new(millis, 0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self
            .next_millis
            .fetch_add(self.step_millis, Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}

pub fn is_reserved_time_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    RESERVED_TIME_FIELDS.contains(&lower.as_str())
}

/// Normalize one source row at the instant `now`. Never fails.
pub fn normalize(raw: &RawRecord, now: DateTime<Utc>) -> NormalizedRecord {
    let mut fields = BTreeMap::new();

    for (name, value) in raw.iter() {
        if is_reserved_time_field(name) || name == UPLOAD_TIME_FIELD {
            continue;
        }

        let value = match value {
            RawValue::Number(n) if n.is_finite() => FieldValue::Number(*n),
            // NaN, +/-inf and missing cells all read as zero
            RawValue::Number(_) | RawValue::Missing => FieldValue::Number(0.0),
            RawValue::Text(s) => FieldValue::Text(s.clone()),
        };
        fields.insert(name.to_string(), value);
    }

    NormalizedRecord {
        fields,
        timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
        upload_time: now.timestamp_millis(),
    }
}

/// Normalizer bound to a clock
#[derive(Clone)]
pub struct Normalizer {
    clock: Arc<dyn Clock>,
}

impl Normalizer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn normalize(&self, raw: &RawRecord) -> NormalizedRecord {
        normalize(raw, self.clock.now())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TIMESTAMP_FIELD;

    fn sample_row() -> RawRecord {
        RawRecord::new()
            .with("Time", "2024-03-01 10:00:00")
            .with("Clinker_Inlet_Temp", 1312.4)
            .with("Clinker_Outlet_Temp", RawValue::Missing)
            .with("Cooling_Air_Flow", f64::NAN)
            .with("Grate_Speed", f64::INFINITY)
            .with("Operator", "shift-b")
    }

    #[test]
    fn coerces_missing_and_drops_time_columns() {
        let record = normalize(&sample_row(), ManualClock::fixed(1_709_287_200_000).now());

        assert!(record.get("Time").is_none());
        assert_eq!(record.number("Clinker_Inlet_Temp"), Some(1312.4));
        assert_eq!(record.number("Clinker_Outlet_Temp"), Some(0.0));
        assert_eq!(record.number("Cooling_Air_Flow"), Some(0.0));
        assert_eq!(record.number("Grate_Speed"), Some(0.0));
        assert_eq!(
            record.get("Operator"),
            Some(&FieldValue::Text("shift-b".to_string()))
        );
        assert_eq!(record.upload_time, 1_709_287_200_000);
        assert_eq!(record.timestamp, "2024-03-01T10:00:00.000000Z");
    }

    #[test]
    fn reserved_names_match_case_insensitively() {
        assert!(is_reserved_time_field("TIME"));
        assert!(is_reserved_time_field("TimeStamp"));
        assert!(!is_reserved_time_field("Time_Of_Day"));

        let raw = RawRecord::new()
            .with("TIMESTAMP", "yesterday")
            .with("time", 5.0)
            .with("Grate_Speed", 11.0);
        let record = normalize(&raw, Utc::now());
        assert_eq!(record.fields.len(), 1);
        assert!(record.to_json().get("TIMESTAMP").is_none());
    }

    #[test]
    fn output_never_contains_null() {
        let record = normalize(&sample_row(), Utc::now());
        let json = record.to_json();
        let obj = json.as_object().unwrap();
        assert!(obj.values().all(|v| !v.is_null()));
        assert!(obj.contains_key(TIMESTAMP_FIELD));
        assert!(obj.contains_key(UPLOAD_TIME_FIELD));
    }

    #[test]
    fn renormalizing_only_changes_injected_fields() {
        let clock = ManualClock::new(1_000, 5_000);
        let first = normalize(&sample_row(), clock.now());
        let second = normalize(&RawRecord::from(&first), clock.now());

        assert_eq!(first.fields, second.fields);
        assert_ne!(first.upload_time, second.upload_time);
        assert_ne!(first.timestamp, second.timestamp);
    }

    #[test]
    fn raw_upload_time_is_overwritten() {
        let raw = RawRecord::new().with("upload_time", 1.0).with("Grate_Speed", 9.0);
        let record = normalize(&raw, ManualClock::fixed(42_000).now());
        assert_eq!(record.upload_time, 42_000);
        assert!(record.get("upload_time").is_none());
    }

    #[test]
    fn system_clock_is_non_decreasing() {
        let clock = SystemClock::new();
        let mut last = clock.now().timestamp_millis();
        for _ in 0..1000 {
            let next = clock.now().timestamp_millis();
            assert!(next >= last);
            last = next;
        }
    }

    #[test]
    fn manual_clock_steps() {
        let clock = ManualClock::new(10, 5);
        assert_eq!(clock.now().timestamp_millis(), 10);
        assert_eq!(clock.now().timestamp_millis(), 15);
    }
}
