use chrono::{Datelike, NaiveDateTime, Timelike};
use thiserror::Error;

/// Errors produced while building or loading a bar table.
#[derive(Debug, Error)]
pub enum BarTableError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv missing required column: '{0}'")]
    MissingColumn(String),
    #[error("csv row {row}: cannot parse field '{field}' from value '{raw}'")]
    ParseField {
        row: usize,
        field: &'static str,
        raw: String,
    },
    #[error("bar table is empty")]
    Empty,
    #[error("timestamps not strictly increasing at index {0}")]
    NonMonotonicTimestamp(usize),
    #[error("OHLC order violated at index {index}: o={open} h={high} l={low} c={close}")]
    OhlcOrder {
        index: usize,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
    #[error("negative volume at index {0}")]
    NegativeVolume(usize),
}

/// Immutable columnar view of OHLCV bars for one (symbol, interval).
///
/// Columns are parallel `f64` vectors; `minute_of_day` and `day_ordinal` are
/// precomputed from the timestamps so kernels can run session logic without
/// touching chrono in the hot loop. Day ordinals (days since CE) detect new
/// trading sessions — near-24h instruments make wall-clock wraparound
/// unreliable.
#[derive(Debug, Clone)]
pub struct BarTable {
    symbol: String,
    interval: String,
    timestamps: Vec<NaiveDateTime>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    minute_of_day: Vec<u32>,
    day_ordinal: Vec<i64>,
    volume_synthetic: bool,
}

impl BarTable {
    /// Build and validate a table. Bars must arrive oldest-first.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        interval: impl Into<String>,
        timestamps: Vec<NaiveDateTime>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
        volume: Vec<f64>,
        volume_synthetic: bool,
    ) -> Result<Self, BarTableError> {
        if timestamps.is_empty() {
            return Err(BarTableError::Empty);
        }

        for i in 0..timestamps.len() {
            if i > 0 && timestamps[i] <= timestamps[i - 1] {
                return Err(BarTableError::NonMonotonicTimestamp(i));
            }
            let (o, h, l, c) = (open[i], high[i], low[i], close[i]);
            let body_lo = o.min(c);
            let body_hi = o.max(c);
            if !(l <= body_lo && body_hi <= h) {
                return Err(BarTableError::OhlcOrder {
                    index: i,
                    open: o,
                    high: h,
                    low: l,
                    close: c,
                });
            }
            if volume[i] < 0.0 {
                return Err(BarTableError::NegativeVolume(i));
            }
        }

        let minute_of_day = timestamps
            .iter()
            .map(|ts| ts.hour() * 60 + ts.minute())
            .collect();
        let day_ordinal = timestamps
            .iter()
            .map(|ts| i64::from(ts.date().num_days_from_ce()))
            .collect();

        Ok(Self {
            symbol: symbol.into(),
            interval: interval.into(),
            timestamps,
            open,
            high,
            low,
            close,
            volume,
            minute_of_day,
            day_ordinal,
            volume_synthetic,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn open(&self) -> &[f64] {
        &self.open
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn close(&self) -> &[f64] {
        &self.close
    }

    pub fn volume(&self) -> &[f64] {
        &self.volume
    }

    /// Minute of day (0..1440) per bar.
    pub fn minute_of_day(&self) -> &[u32] {
        &self.minute_of_day
    }

    /// Calendar day ordinal per bar; a change marks a new trading session.
    pub fn day_ordinal(&self) -> &[i64] {
        &self.day_ordinal
    }

    /// True when the source file had no volume column and 1.0 was filled in.
    pub fn volume_synthetic(&self) -> bool {
        self.volume_synthetic
    }

    pub fn first_timestamp(&self) -> NaiveDateTime {
        self.timestamps[0]
    }

    pub fn last_timestamp(&self) -> NaiveDateTime {
        self.timestamps[self.timestamps.len() - 1]
    }
}
