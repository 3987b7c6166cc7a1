use backtest_engine::MetricBundle;
use serde::{Deserialize, Serialize};

/// Stage thresholds and statistical test sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub min_trades_s1: i64,
    pub s2_sharpe: f64,
    pub s2_pf: f64,
    /// Max drawdown ceiling, percent of peak.
    pub s2_max_dd: f64,
    /// Win-rate floor, percent.
    pub s2_wr: f64,
    pub s3_sharpe_floor: f64,
    /// Relative perturbation applied to each numeric param in S3.
    pub s3_perturbation_delta: f64,
    pub p_max: f64,
    /// DSR confidence floor in [0, 1].
    pub dsr_floor: f64,
    /// VaR95 floor as a fraction of initial capital (e.g. -0.25).
    pub var_floor: f64,
    pub n_mc: usize,
    pub n_perm: usize,
    pub complement_floor: f64,
    pub max_strikes: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_trades_s1: 200,
            s2_sharpe: 1.0,
            s2_pf: 1.3,
            s2_max_dd: 25.0,
            s2_wr: 40.0,
            s3_sharpe_floor: 0.5,
            s3_perturbation_delta: 0.1,
            p_max: 0.05,
            dsr_floor: 0.9,
            var_floor: -0.25,
            n_mc: 1000,
            n_perm: 500,
            complement_floor: 50.0,
            max_strikes: 3,
        }
    }
}

/// S1 — viability: the strategy made money and traded enough to mean it.
pub fn stage1(m: &MetricBundle, cfg: &PipelineConfig) -> Result<(), String> {
    if m.net_profit <= 0.0 {
        return Err(format!("S1 fail: net profit {:.2} <= 0", m.net_profit));
    }
    if m.total_trades < cfg.min_trades_s1 {
        return Err(format!(
            "S1 fail: {} trades < {} required",
            m.total_trades, cfg.min_trades_s1
        ));
    }
    if m.sharpe <= 0.0 {
        return Err(format!("S1 fail: sharpe {:.2} <= 0", m.sharpe));
    }
    Ok(())
}

/// S2 — gauntlet: composite quality bar.
pub fn stage2(m: &MetricBundle, cfg: &PipelineConfig) -> Result<(), String> {
    if m.sharpe < cfg.s2_sharpe {
        return Err(format!("S2 fail: sharpe {:.2} < {:.2}", m.sharpe, cfg.s2_sharpe));
    }
    if m.profit_factor < cfg.s2_pf {
        return Err(format!(
            "S2 fail: profit factor {:.2} < {:.2}",
            m.profit_factor, cfg.s2_pf
        ));
    }
    if m.max_drawdown_pct > cfg.s2_max_dd {
        return Err(format!(
            "S2 fail: max drawdown {:.1}% > {:.1}%",
            m.max_drawdown_pct, cfg.s2_max_dd
        ));
    }
    if m.win_rate < cfg.s2_wr {
        return Err(format!(
            "S2 fail: win rate {:.1}% < {:.1}%",
            m.win_rate, cfg.s2_wr
        ));
    }
    Ok(())
}

/// S3 — robustness: median Sharpe across parameter-neighborhood retests.
pub fn stage3(median_sharpe: f64, cfg: &PipelineConfig) -> Result<(), String> {
    if median_sharpe < cfg.s3_sharpe_floor {
        return Err(format!(
            "S3 fail: median perturbed sharpe {:.2} < {:.2}",
            median_sharpe, cfg.s3_sharpe_floor
        ));
    }
    Ok(())
}

/// S4 — statistical audit on the (now populated) expensive metrics.
pub fn stage4(m: &MetricBundle, cfg: &PipelineConfig) -> Result<(), String> {
    let p = m
        .permutation_pvalue
        .ok_or_else(|| "S4 fail: permutation p-value missing".to_string())?;
    if p > cfg.p_max {
        return Err(format!("S4 fail: permutation p {:.3} > {:.3}", p, cfg.p_max));
    }
    let dsr = m
        .deflated_sharpe
        .ok_or_else(|| "S4 fail: deflated sharpe missing".to_string())?;
    if dsr < cfg.dsr_floor {
        return Err(format!("S4 fail: DSR {:.3} < {:.3}", dsr, cfg.dsr_floor));
    }
    let var = m
        .monte_carlo_var95
        .ok_or_else(|| "S4 fail: Monte-Carlo VaR missing".to_string())?;
    if var < cfg.var_floor {
        return Err(format!("S4 fail: VaR95 {:.3} < {:.3}", var, cfg.var_floor));
    }
    Ok(())
}

/// S5 — portfolio fit.
pub fn stage5(complement_score: f64, cfg: &PipelineConfig) -> Result<(), String> {
    if complement_score < cfg.complement_floor {
        return Err(format!(
            "S5 fail: complementarity {:.1} < {:.1}",
            complement_score, cfg.complement_floor
        ));
    }
    Ok(())
}

pub fn median(values: &mut Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_metrics() -> MetricBundle {
        MetricBundle {
            net_profit: 15_000.0,
            total_return_pct: 15.0,
            cagr: 0.14,
            ending_equity: 115_000.0,
            sharpe: 1.6,
            profit_factor: 1.9,
            max_drawdown: 5_000.0,
            max_drawdown_pct: 4.8,
            win_rate: 54.0,
            total_trades: 310,
            win_trades: 167,
            loss_trades: 143,
            avg_trade_pnl: 48.4,
            monte_carlo_var95: Some(-0.06),
            permutation_pvalue: Some(0.012),
            deflated_sharpe: Some(0.96),
        }
    }

    #[test]
    fn healthy_strategy_passes_every_gate() {
        let cfg = PipelineConfig::default();
        let m = healthy_metrics();
        assert!(stage1(&m, &cfg).is_ok());
        assert!(stage2(&m, &cfg).is_ok());
        assert!(stage3(0.8, &cfg).is_ok());
        assert!(stage4(&m, &cfg).is_ok());
        assert!(stage5(62.5, &cfg).is_ok());
    }

    #[test]
    fn s1_rejects_unprofitable_and_thin_samples() {
        let cfg = PipelineConfig::default();
        let mut m = healthy_metrics();
        m.net_profit = -10.0;
        assert!(stage1(&m, &cfg).unwrap_err().contains("net profit"));

        let mut m = healthy_metrics();
        m.total_trades = 150;
        assert!(stage1(&m, &cfg).unwrap_err().contains("150 trades"));

        let mut m = healthy_metrics();
        m.sharpe = -0.2;
        assert!(stage1(&m, &cfg).is_err());
    }

    #[test]
    fn s2_checks_each_leg_of_the_gauntlet() {
        let cfg = PipelineConfig::default();
        let mut m = healthy_metrics();
        m.sharpe = 0.8;
        assert!(stage2(&m, &cfg).unwrap_err().contains("sharpe"));

        let mut m = healthy_metrics();
        m.profit_factor = 1.1;
        assert!(stage2(&m, &cfg).unwrap_err().contains("profit factor"));

        let mut m = healthy_metrics();
        m.max_drawdown_pct = 30.0;
        assert!(stage2(&m, &cfg).unwrap_err().contains("drawdown"));

        let mut m = healthy_metrics();
        m.win_rate = 35.0;
        assert!(stage2(&m, &cfg).unwrap_err().contains("win rate"));
    }

    #[test]
    fn s4_requires_populated_statistics() {
        let cfg = PipelineConfig::default();
        let mut m = healthy_metrics();
        m.permutation_pvalue = None;
        assert!(stage4(&m, &cfg).unwrap_err().contains("missing"));

        let mut m = healthy_metrics();
        m.permutation_pvalue = Some(0.2);
        assert!(stage4(&m, &cfg).unwrap_err().contains("permutation"));

        let mut m = healthy_metrics();
        m.deflated_sharpe = Some(0.5);
        assert!(stage4(&m, &cfg).unwrap_err().contains("DSR"));

        let mut m = healthy_metrics();
        m.monte_carlo_var95 = Some(-0.4);
        assert!(stage4(&m, &cfg).unwrap_err().contains("VaR95"));
    }

    #[test]
    fn median_handles_odd_even_and_empty() {
        assert_eq!(median(&mut vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut vec![4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&mut Vec::new()).is_nan());
    }
}
