use serde::{
    ser::{SerializeMap, Serializer},
    Deserialize, Serialize,
};
use std::collections::BTreeMap;

/// Field injected by the normalizer and used as the retention sort key.
pub const UPLOAD_TIME_FIELD: &str = "upload_time";
/// Field injected by the normalizer with the wall-clock time of normalization.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// One untyped scalar as read from a record source
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Missing,
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Missing => true,
            RawValue::Number(n) => n.is_nan(),
            RawValue::Text(_) => false,
        }
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => RawValue::Missing,
            Value::Bool(b) => RawValue::Number(if b { 1.0 } else { 0.0 }),
            Value::Number(n) => n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Missing),
            Value::String(s) => RawValue::Text(s),
            other => RawValue::Text(other.to_string()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl Serialize for RawValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawValue::Missing => serializer.serialize_none(),
            RawValue::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            RawValue::Number(_) => serializer.serialize_none(),
            RawValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// A source row: field names in source column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, RawValue)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, keeping the position of an existing one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RawValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for RawRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A normalized field value. Never null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

/// Canonical record published to the store.
///
/// Serializes as one flat JSON object: every field plus `timestamp` and
/// `upload_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: String,
    pub upload_time: i64,
}

impl NormalizedRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_f64)
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Every field is a finite f64 or a string, so this cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<&NormalizedRecord> for RawRecord {
    fn from(record: &NormalizedRecord) -> Self {
        let mut raw = RawRecord::new();
        for (name, value) in &record.fields {
            let value = match value {
                FieldValue::Number(n) => RawValue::Number(*n),
                FieldValue::Text(s) => RawValue::Text(s.clone()),
            };
            raw.insert(name.clone(), value);
        }
        raw.insert(TIMESTAMP_FIELD, RawValue::Text(record.timestamp.clone()));
        raw.insert(UPLOAD_TIME_FIELD, RawValue::Number(record.upload_time as f64));
        raw
    }
}

/// Stream status reported on the metadata side-channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Active,
    Stopped,
}

impl StreamStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StreamStatus::Active => "active",
            StreamStatus::Stopped => "stopped",
        }
    }
}

/// Replay progress, owned and mutated by the scheduler only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamState {
    pub current_index: usize,
    pub total_records: usize,
    pub loop_enabled: bool,
    pub status: StreamStatus,
}

impl StreamState {
    pub fn new(total_records: usize, loop_enabled: bool) -> Self {
        Self {
            current_index: 0,
            total_records,
            loop_enabled,
            status: StreamStatus::Stopped,
        }
    }

    /// Percentage of the sequence covered once `current_index` is published.
    pub fn progress_percent(&self) -> f64 {
        if self.total_records == 0 {
            return 100.0;
        }
        ((self.current_index + 1) as f64 / self.total_records as f64) * 100.0
    }
}

/// Overwritten status record published after each tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub last_update: String,
    pub current_index: usize,
    pub total_records: usize,
    pub update_interval_seconds: u64,
    pub status: StreamStatus,
}
