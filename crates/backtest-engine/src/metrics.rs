use crate::models::{EngineConfig, MetricBundle, Trade};

/// Compute the base metric bundle from an engine run.
///
/// Sharpe is annualized with `sqrt(bars_per_year)` and reported as 0 when
/// the return stddev is 0 (constant prices, empty signals). Profit factor is
/// infinite with winners and no losers, 0 with no winners.
pub fn compute_metrics(
    equity_curve: &[f64],
    net_returns: &[f64],
    trades: &[Trade],
    config: &EngineConfig,
) -> MetricBundle {
    let ending_equity = equity_curve.last().copied().unwrap_or(config.initial_capital);
    let net_profit = ending_equity - config.initial_capital;
    let total_return_pct = if config.initial_capital > 0.0 {
        (ending_equity / config.initial_capital - 1.0) * 100.0
    } else {
        0.0
    };

    let sharpe = annualized_sharpe(net_returns, config.bars_per_year);
    let (max_drawdown, max_drawdown_pct) = max_drawdown(equity_curve);

    let cagr = if equity_curve.len() > 1 && config.initial_capital > 0.0 {
        let ratio = ending_equity / config.initial_capital;
        if ratio <= 0.0 {
            -1.0
        } else {
            ratio.powf(config.bars_per_year / equity_curve.len() as f64) - 1.0
        }
    } else {
        0.0
    };

    let total_trades = trades.len() as i64;
    let win_trades = trades.iter().filter(|t| t.pnl > 0.0).count() as i64;
    let loss_trades = total_trades - win_trades;
    let win_rate = if total_trades > 0 {
        win_trades as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl.abs())
        .sum();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_trade_pnl = if total_trades > 0 {
        trades.iter().map(|t| t.pnl).sum::<f64>() / total_trades as f64
    } else {
        0.0
    };

    MetricBundle {
        net_profit,
        total_return_pct,
        cagr,
        ending_equity,
        sharpe,
        profit_factor,
        max_drawdown,
        max_drawdown_pct,
        win_rate,
        total_trades,
        win_trades,
        loss_trades,
        avg_trade_pnl,
        monte_carlo_var95: None,
        permutation_pvalue: None,
        deflated_sharpe: None,
    }
}

/// Annualized Sharpe on per-bar returns; 0 when undefined.
pub fn annualized_sharpe(returns: &[f64], bars_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std > 0.0 {
        mean / std * bars_per_year.sqrt()
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline, in dollars and percent of the peak.
pub fn max_drawdown(equity_curve: &[f64]) -> (f64, f64) {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0f64;
    let mut max_dd_pct = 0.0f64;
    for &e in equity_curve {
        if e > peak {
            peak = e;
        }
        let dd = peak - e;
        if dd > max_dd {
            max_dd = dd;
        }
        if peak > 0.0 {
            let dd_pct = dd / peak * 100.0;
            if dd_pct > max_dd_pct {
                max_dd_pct = dd_pct;
            }
        }
    }
    (max_dd, max_dd_pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharpe_zero_for_constant_returns() {
        assert_eq!(annualized_sharpe(&[0.01; 50], 252.0), 0.0);
        assert_eq!(annualized_sharpe(&[0.0; 50], 252.0), 0.0);
        assert_eq!(annualized_sharpe(&[0.01], 252.0), 0.0);
    }

    #[test]
    fn sharpe_sign_follows_mean() {
        let up: Vec<f64> = (0..100).map(|i| 0.01 + (i % 2) as f64 * 0.001).collect();
        assert!(annualized_sharpe(&up, 252.0) > 0.0);
        let down: Vec<f64> = up.iter().map(|r| -r).collect();
        assert!(annualized_sharpe(&down, 252.0) < 0.0);
    }

    #[test]
    fn drawdown_on_simple_curve() {
        let curve = [100.0, 110.0, 99.0, 104.5, 120.0];
        let (dd, dd_pct) = max_drawdown(&curve);
        assert!((dd - 11.0).abs() < 1e-12);
        assert!((dd_pct - 10.0).abs() < 1e-12);
    }

    #[test]
    fn drawdown_zero_on_monotonic_curve() {
        let curve = [100.0, 101.0, 102.0];
        assert_eq!(max_drawdown(&curve), (0.0, 0.0));
    }
}
