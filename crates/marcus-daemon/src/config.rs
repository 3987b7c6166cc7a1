use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use backtest_engine::EngineConfig;
use pipeline::PipelineConfig;

/// Flat JSON daemon configuration. Every field has a compiled default, so a
/// partial config file (or none at all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarcusConfig {
    // Scheduling
    pub cycle_interval_minutes: u64,
    pub dashboard_refresh_minutes: u64,
    pub health_check_minutes: u64,

    // Paths
    pub db_path: String,
    pub data_dir: String,
    pub logs_dir: String,
    pub reports_dir: String,
    pub state_file: String,
    pub dashboard_path: String,

    // Logging
    pub log_level: String,
    pub log_rotate_bytes: u64,
    pub max_log_files: u32,

    // Instrument & cost model
    pub symbol: String,
    pub interval: String,
    pub initial_capital: f64,
    pub commission: f64,
    pub slippage: f64,
    pub volatility_factor: f64,
    pub point_value: f64,
    pub bars_per_year: f64,

    // Pipeline thresholds
    pub min_trades_s1: i64,
    pub s2_sharpe: f64,
    pub s2_pf: f64,
    pub s2_max_dd: f64,
    pub s2_wr: f64,
    pub s3_sharpe_floor: f64,
    pub s3_perturbation_delta: f64,
    pub p_max: f64,
    pub dsr_floor: f64,
    pub var_floor: f64,
    pub n_mc: usize,
    pub n_perm: usize,
    pub complement_floor: f64,
    pub max_strikes: i64,

    // Idea source
    pub idea_source_enabled: bool,
    pub idea_source_url: String,
    pub idea_source_model: String,
}

impl Default for MarcusConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let gates = PipelineConfig::default();
        Self {
            cycle_interval_minutes: 240,
            dashboard_refresh_minutes: 15,
            health_check_minutes: 5,
            db_path: "marcus_registry.db".to_string(),
            data_dir: "data".to_string(),
            logs_dir: "logs".to_string(),
            reports_dir: "reports".to_string(),
            state_file: "logs/marcus_state.json".to_string(),
            dashboard_path: "reports/dashboard.html".to_string(),
            log_level: "info".to_string(),
            log_rotate_bytes: 10_000_000,
            max_log_files: 5,
            symbol: "NQ".to_string(),
            interval: "5min".to_string(),
            initial_capital: engine.initial_capital,
            commission: engine.commission,
            slippage: engine.slippage,
            volatility_factor: engine.volatility_factor,
            point_value: engine.point_value,
            bars_per_year: engine.bars_per_year,
            min_trades_s1: gates.min_trades_s1,
            s2_sharpe: gates.s2_sharpe,
            s2_pf: gates.s2_pf,
            s2_max_dd: gates.s2_max_dd,
            s2_wr: gates.s2_wr,
            s3_sharpe_floor: gates.s3_sharpe_floor,
            s3_perturbation_delta: gates.s3_perturbation_delta,
            p_max: gates.p_max,
            dsr_floor: gates.dsr_floor,
            var_floor: gates.var_floor,
            n_mc: gates.n_mc,
            n_perm: gates.n_perm,
            complement_floor: gates.complement_floor,
            max_strikes: gates.max_strikes,
            idea_source_enabled: false,
            idea_source_url: "http://localhost:11434".to_string(),
            idea_source_model: "llama3".to_string(),
        }
    }
}

impl MarcusConfig {
    /// Load from a JSON file, or compiled defaults when `path` is None.
    /// An unreadable or malformed file is a fatal startup error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("cannot read config file {}", p.display()))?;
                let config: Self = serde_json::from_str(&text)
                    .with_context(|| format!("malformed config file {}", p.display()))?;
                Ok(config)
            }
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            initial_capital: self.initial_capital,
            commission: self.commission,
            slippage: self.slippage,
            volatility_factor: self.volatility_factor,
            point_value: self.point_value,
            bars_per_year: self.bars_per_year,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_trades_s1: self.min_trades_s1,
            s2_sharpe: self.s2_sharpe,
            s2_pf: self.s2_pf,
            s2_max_dd: self.s2_max_dd,
            s2_wr: self.s2_wr,
            s3_sharpe_floor: self.s3_sharpe_floor,
            s3_perturbation_delta: self.s3_perturbation_delta,
            p_max: self.p_max,
            dsr_floor: self.dsr_floor,
            var_floor: self.var_floor,
            n_mc: self.n_mc,
            n_perm: self.n_perm,
            complement_floor: self.complement_floor,
            max_strikes: self.max_strikes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_config_file() {
        let cfg = MarcusConfig::load(None).unwrap();
        assert_eq!(cfg.cycle_interval_minutes, 240);
        assert_eq!(cfg.symbol, "NQ");
        assert_eq!(cfg.min_trades_s1, 200);
        assert!(!cfg.idea_source_enabled);
    }

    #[test]
    fn partial_config_overlays_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"symbol": "ES", "cycle_interval_minutes": 60, "s2_sharpe": 1.5}}"#).unwrap();
        let cfg = MarcusConfig::load(Some(f.path())).unwrap();
        assert_eq!(cfg.symbol, "ES");
        assert_eq!(cfg.cycle_interval_minutes, 60);
        assert_eq!(cfg.s2_sharpe, 1.5);
        // Untouched keys keep defaults.
        assert_eq!(cfg.interval, "5min");
        assert_eq!(cfg.point_value, 20.0);
    }

    #[test]
    fn malformed_config_is_fatal() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{not json").unwrap();
        assert!(MarcusConfig::load(Some(f.path())).is_err());
    }

    #[test]
    fn missing_config_file_is_fatal() {
        assert!(MarcusConfig::load(Some(Path::new("/nonexistent/marcus.json"))).is_err());
    }
}
