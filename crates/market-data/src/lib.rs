pub mod ingest;
pub mod table;

pub use ingest::{load_csv, parse_csv};
pub use table::{BarTable, BarTableError};

use std::path::{Path, PathBuf};

/// Read-only store of OHLCV bar tables keyed by (symbol, interval).
///
/// Files live under `data_dir` as `{SYMBOL}_{interval}.csv`. Tables are
/// validated once on load and immutable afterwards.
pub struct BarStore {
    data_dir: PathBuf,
}

impl BarStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Load the bar table for (symbol, interval).
    pub fn load(&self, symbol: &str, interval: &str) -> Result<BarTable, BarTableError> {
        let path = self.data_dir.join(format!("{symbol}_{interval}.csv"));
        let table = load_csv(&path, symbol, interval)?;
        tracing::info!(
            symbol,
            interval,
            bars = table.len(),
            synthetic_volume = table.volume_synthetic(),
            "bar table loaded"
        );
        Ok(table)
    }

    /// True when at least one CSV file is present under the data directory.
    pub fn has_any_data(&self) -> bool {
        std::fs::read_dir(&self.data_dir)
            .map(|entries| {
                entries.flatten().any(|e| {
                    e.path()
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("csv"))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }
}
