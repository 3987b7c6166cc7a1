use market_data::BarTable;

use crate::metrics::compute_metrics;
use crate::models::*;

/// Vectorized backtest engine with the futures-aware cost model.
///
/// Signals are applied with a one-bar execution lag, returns are
/// close-to-close, and per-bar costs are charged on turnover as a fraction of
/// notional (price × point_value). The same (bars, signals) input always
/// produces the same equity curve.
pub struct VectorEngine {
    config: EngineConfig,
}

impl VectorEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the backtest and compute the base metric bundle.
    pub fn run(&self, bars: &BarTable, signals: &[i8]) -> Result<BacktestResult, EngineError> {
        let n = bars.len();
        if signals.len() != n {
            return Err(EngineError::SignalLengthMismatch {
                signals: signals.len(),
                bars: n,
            });
        }

        let (position, net_returns, turnover) = self.net_returns(bars, signals)?;

        // Equity recursion. Bankruptcy is terminal: once the curve touches
        // zero it stays there.
        let mut equity_curve = Vec::with_capacity(n);
        let mut equity = self.config.initial_capital;
        for &r in &net_returns {
            equity *= 1.0 + r;
            if equity <= 0.0 {
                equity = 0.0;
            }
            equity_curve.push(equity);
        }

        let trades = reconstruct_trades(bars, &position, &equity_curve, &self.config);
        let metrics = compute_metrics(&equity_curve, &net_returns, &trades, &self.config);
        tracing::debug!(
            bars = n,
            trades = trades.len(),
            sharpe = metrics.sharpe,
            "backtest complete"
        );

        if !metrics.sharpe.is_finite() || !metrics.ending_equity.is_finite() {
            return Err(EngineError::Evaluation(format!(
                "non-finite metrics (sharpe={}, ending_equity={})",
                metrics.sharpe, metrics.ending_equity
            )));
        }

        Ok(BacktestResult {
            equity_curve,
            net_returns,
            turnover,
            position,
            trades,
            metrics,
        })
    }

    /// Core per-bar arithmetic shared by `run` and the permutation test.
    ///
    /// Returns (position, net_returns, turnover). `net_returns[0]` is always
    /// zero since no position can be held through the first bar.
    pub(crate) fn net_returns(
        &self,
        bars: &BarTable,
        signals: &[i8],
    ) -> Result<(Vec<i8>, Vec<f64>, Vec<f64>), EngineError> {
        let n = bars.len();
        let closes = bars.close();
        let highs = bars.high();
        let lows = bars.low();
        let cfg = &self.config;

        let mut position = vec![0i8; n];
        for i in 1..n {
            position[i] = signals[i - 1];
        }

        let mut net_returns = vec![0.0; n];
        let mut turnover = vec![0.0; n];
        let mut safe_close = closes[0].max(1.0);
        for i in 0..n {
            if closes[i] > 0.0 {
                safe_close = closes[i];
            }
            let prev_pos = if i > 0 { position[i - 1] } else { 0 };
            let tau = (position[i] - prev_pos).abs() as f64;
            turnover[i] = tau;

            let gross = if i > 0 && closes[i - 1] > 0.0 {
                f64::from(position[i]) * (closes[i] / closes[i - 1] - 1.0)
            } else {
                0.0
            };

            let cost_dollars =
                cfg.commission + cfg.slippage + cfg.volatility_factor * (highs[i] - lows[i]);
            let notional = safe_close * cfg.point_value;
            let cost = tau * cost_dollars / notional;

            let r = gross - cost;
            if !r.is_finite() {
                return Err(EngineError::Evaluation(format!(
                    "non-finite net return at bar {i}"
                )));
            }
            net_returns[i] = r;
        }

        Ok((position, net_returns, turnover))
    }
}

/// Pair consecutive non-flat runs of the position series into trades.
///
/// Entry is the close the position was taken at (the bar before the run
/// starts); exit is the close of the run's last bar. PnL is read off the
/// equity curve so it already carries costs.
fn reconstruct_trades(
    bars: &BarTable,
    position: &[i8],
    equity_curve: &[f64],
    config: &EngineConfig,
) -> Vec<Trade> {
    let closes = bars.close();
    let timestamps = bars.timestamps();
    let n = position.len();
    let mut trades = Vec::new();

    let mut i = 1;
    while i < n {
        if position[i] == 0 {
            i += 1;
            continue;
        }
        let direction = position[i];
        let entry_index = i;
        let mut exit_index = i;
        while exit_index + 1 < n && position[exit_index + 1] == direction {
            exit_index += 1;
        }

        let equity_before = if entry_index > 0 {
            equity_curve[entry_index - 1]
        } else {
            config.initial_capital
        };
        let pnl = equity_curve[exit_index] - equity_before;
        let return_pct = if equity_before > 0.0 {
            pnl / equity_before * 100.0
        } else {
            0.0
        };

        trades.push(Trade {
            direction,
            entry_index,
            exit_index,
            entry_time: timestamps[entry_index],
            exit_time: timestamps[exit_index],
            entry_price: closes[entry_index - 1],
            exit_price: closes[exit_index],
            bars_held: exit_index - entry_index + 1,
            pnl,
            return_pct,
        });

        i = exit_index + 1;
    }

    trades
}
