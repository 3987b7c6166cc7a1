//! CSV ingestion for OHLCV bars.
//!
//! Column matching is case-insensitive and order-independent. The timestamp
//! column may be named `timestamp`, `datetime`, `date` or `time`; OHLC columns
//! are required, volume is optional (filled with 1.0 and flagged when absent).

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDateTime;

use crate::table::{BarTable, BarTableError};

const TIMESTAMP_NAMES: &[&str] = &["timestamp", "datetime", "date", "time"];
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

/// Load and validate a bar table from a CSV file on disk.
pub fn load_csv(path: &Path, symbol: &str, interval: &str) -> Result<BarTable, BarTableError> {
    let text = std::fs::read_to_string(path).map_err(|source| BarTableError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_csv(&text, symbol, interval)
}

/// Parse CSV text into a validated bar table.
pub fn parse_csv(text: &str, symbol: &str, interval: &str) -> Result<BarTable, BarTableError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or(BarTableError::Empty)?;
    let columns: HashMap<String, usize> = header
        .split(',')
        .enumerate()
        .map(|(i, name)| (name.trim().trim_matches('"').to_ascii_lowercase(), i))
        .collect();

    let ts_col = TIMESTAMP_NAMES
        .iter()
        .find_map(|name| columns.get(*name).copied())
        .ok_or_else(|| BarTableError::MissingColumn("timestamp".to_string()))?;
    let col = |name: &str| -> Result<usize, BarTableError> {
        columns
            .get(name)
            .copied()
            .ok_or_else(|| BarTableError::MissingColumn(name.to_string()))
    };
    let open_col = col("open")?;
    let high_col = col("high")?;
    let low_col = col("low")?;
    let close_col = col("close")?;
    let volume_col = columns.get("volume").copied();

    let mut timestamps = Vec::new();
    let mut open = Vec::new();
    let mut high = Vec::new();
    let mut low = Vec::new();
    let mut close = Vec::new();
    let mut volume = Vec::new();

    for (row, line) in lines {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim().trim_matches('"')).collect();

        let ts_raw = fields.get(ts_col).copied().unwrap_or("");
        timestamps.push(parse_timestamp(ts_raw, row)?);
        open.push(parse_num(&fields, open_col, "open", row)?);
        high.push(parse_num(&fields, high_col, "high", row)?);
        low.push(parse_num(&fields, low_col, "low", row)?);
        close.push(parse_num(&fields, close_col, "close", row)?);
        if let Some(vc) = volume_col {
            volume.push(parse_num(&fields, vc, "volume", row)?);
        }
    }

    let volume_synthetic = volume_col.is_none();
    if volume_synthetic {
        volume = vec![1.0; timestamps.len()];
    }

    BarTable::new(
        symbol,
        interval,
        timestamps,
        open,
        high,
        low,
        close,
        volume,
        volume_synthetic,
    )
}

fn parse_num(
    fields: &[&str],
    idx: usize,
    field: &'static str,
    row: usize,
) -> Result<f64, BarTableError> {
    let raw = fields.get(idx).copied().unwrap_or("");
    raw.parse::<f64>().map_err(|_| BarTableError::ParseField {
        row,
        field,
        raw: raw.to_string(),
    })
}

fn parse_timestamp(raw: &str, row: usize) -> Result<NaiveDateTime, BarTableError> {
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(ts);
        }
    }
    // Date-only bars (daily files) land at midnight.
    if let Ok(d) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(ts) = d.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }
    Err(BarTableError::ParseField {
        row,
        field: "timestamp",
        raw: raw.to_string(),
    })
}
