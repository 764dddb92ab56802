//! Record sources
//!
//! Loads the ordered raw sequence the scheduler replays. Supported inputs:
//! - JSON array of objects (`.json`)
//! - JSON Lines (`.jsonl`, `.ndjson`)
//! - a seeded synthetic generator matching the plant's reading profile

use crate::error::LoadError;
use crate::models::{RawRecord, RawValue};
use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;
use std::path::Path;
use tracing::{info, warn};

/// Columns every plant dataset is expected to carry.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "Clinker_Inlet_Temp",
    "Clinker_Outlet_Temp",
    "Cooling_Air_Flow",
    "Secondary_Air_Temp_Cooler",
    "Grate_Speed",
    "Clinker_Production_Rate",
];

/// (column, mean, std-dev) for the synthetic generator
const READING_PROFILE: [(&str, f64, f64); 12] = [
    ("Clinker_Inlet_Temp", 1300.0, 50.0),
    ("Clinker_Outlet_Temp", 100.0, 20.0),
    ("Cooling_Air_Flow", 500.0, 50.0),
    ("Secondary_Air_Temp_Cooler", 900.0, 50.0),
    ("Grate_Speed", 12.0, 3.0),
    ("Clinker_Production_Rate", 130.0, 10.0),
    ("Cement_Mill_Feed_Rate", 135.0, 15.0),
    ("Gypsum_Addition", 3.8, 0.3),
    ("Cement_Mill_Power", 2250.0, 150.0),
    ("Cement_Fineness_Blaine", 350.0, 30.0),
    ("Cement_Fineness_45um", 11.0, 2.0),
    ("Separator_Efficiency", 81.0, 2.0),
];

enum FileFormat {
    JsonArray,
    JsonLines,
}

fn detect_format(path: &Path) -> Result<FileFormat, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => Ok(FileFormat::JsonArray),
        Some("jsonl") | Some("ndjson") => Ok(FileFormat::JsonLines),
        _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Load the full sequence from a data file. Fails on the first malformed row.
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>, LoadError> {
    info!("📊 Loading data from: {}", path.display());

    let format = detect_format(path)?;
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let records = match format {
        FileFormat::JsonArray => parse_json_array(path, &text)?,
        FileFormat::JsonLines => parse_json_lines(path, &text)?,
    };

    if records.is_empty() {
        return Err(LoadError::Empty);
    }

    info!("✅ Loaded {} data records", records.len());
    if let Some(first) = records.first() {
        let columns: Vec<&str> = first.field_names().collect();
        info!("📋 Columns: {:?}", columns);
    }
    warn_missing_columns(&records);

    Ok(records)
}

fn parse_json_array(path: &Path, text: &str) -> Result<Vec<RawRecord>, LoadError> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(text).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            line: source.line(),
            source,
        })?;

    rows.into_iter()
        .enumerate()
        .map(|(row, value)| record_from_value(row, value))
        .collect()
}

fn parse_json_lines(path: &Path, text: &str) -> Result<Vec<RawRecord>, LoadError> {
    let mut records = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|source| LoadError::Parse {
                path: path.to_path_buf(),
                line: line_no + 1,
                source,
            })?;
        records.push(record_from_value(records.len(), value)?);
    }
    Ok(records)
}

fn record_from_value(row: usize, value: serde_json::Value) -> Result<RawRecord, LoadError> {
    let serde_json::Value::Object(map) = value else {
        return Err(LoadError::NotAnObject { row });
    };

    let mut record = RawRecord::new();
    for (name, value) in map {
        record.insert(name.trim(), RawValue::from(value));
    }
    Ok(record)
}

/// Required columns absent from every record in the sequence.
pub fn missing_columns(records: &[RawRecord]) -> Vec<&'static str> {
    REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !records.iter().any(|r| r.get(col).is_some()))
        .collect()
}

/// Missing columns are tolerated; they are only reported.
pub fn warn_missing_columns(records: &[RawRecord]) {
    let missing = missing_columns(records);
    if !missing.is_empty() {
        warn!("⚠️ Missing columns: {:?}", missing);
    }
}

/// Seeded generator for plant readings spaced at a fixed interval
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    pub rows: usize,
    pub seed: u64,
    pub start: DateTime<Utc>,
    pub spacing: ChronoDuration,
}

impl SyntheticGenerator {
    pub fn new(rows: usize, seed: u64) -> Self {
        Self {
            rows,
            seed,
            start: Utc::now(),
            spacing: ChronoDuration::seconds(5),
        }
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub fn generate(&self) -> anyhow::Result<Vec<RawRecord>> {
        use rand::distributions::Distribution;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let distributions = READING_PROFILE
            .iter()
            .map(|(name, mean, std_dev)| {
                Normal::new(*mean, *std_dev)
                    .map(|d| (*name, d))
                    .with_context(|| format!("invalid distribution for {}", name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(self.rows);
        for i in 0..self.rows {
            let at = self.start + self.spacing * i as i32;
            let mut record = RawRecord::new().with(
                "Time",
                RawValue::Text(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
            for (name, dist) in &distributions {
                record.insert(*name, RawValue::Number(dist.sample(&mut rng)));
            }
            records.push(record);
        }

        Ok(records)
    }
}

/// Write a sequence as a pretty JSON array, the format `load_records` reads.
pub fn write_records(path: &Path, records: &[RawRecord]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(records).context("Failed to encode records")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
