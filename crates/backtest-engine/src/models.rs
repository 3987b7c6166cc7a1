use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cost and capital configuration for the vectorized engine.
///
/// Costs are per-contract dollars; the engine converts them into a fraction
/// of notional (price × point_value) at every bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_capital: f64,
    /// Commission per contract per side, in dollars.
    pub commission: f64,
    /// Fixed slippage per contract per side, in dollars.
    pub slippage: f64,
    /// Additional slippage as a fraction of the bar's high-low range.
    pub volatility_factor: f64,
    /// Dollars per point (NQ E-mini: 20).
    pub point_value: f64,
    /// Annualization constant for Sharpe/CAGR.
    pub bars_per_year: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission: 1.0,
            slippage: 1.0,
            volatility_factor: 0.01,
            point_value: 20.0,
            bars_per_year: 69_552.0, // ~252 trading days of 5-min bars, near-24h session
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("signal length {signals} does not match bar count {bars}")]
    SignalLengthMismatch { signals: usize, bars: usize },

    #[error("evaluation error: {0}")]
    Evaluation(String),
}

/// One round-trip reconstructed from the position series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// +1 long, -1 short.
    pub direction: i8,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub bars_held: usize,
    /// Dollar PnL measured on the equity curve across the trade's bars.
    pub pnl: f64,
    /// PnL as a percentage of equity at entry.
    pub return_pct: f64,
}

/// Scalar metrics over one backtest.
///
/// The expensive statistical fields are populated lazily by the later
/// pipeline stages; a plain engine run leaves them `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricBundle {
    pub net_profit: f64,
    pub total_return_pct: f64,
    pub cagr: f64,
    pub ending_equity: f64,
    pub sharpe: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    /// 0-100.
    pub win_rate: f64,
    pub total_trades: i64,
    pub win_trades: i64,
    pub loss_trades: i64,
    pub avg_trade_pnl: f64,
    pub monte_carlo_var95: Option<f64>,
    pub permutation_pvalue: Option<f64>,
    pub deflated_sharpe: Option<f64>,
}

/// Full output of one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// One value per bar; `equity[0] == initial_capital`.
    pub equity_curve: Vec<f64>,
    pub net_returns: Vec<f64>,
    pub turnover: Vec<f64>,
    /// Lagged position actually held through each bar.
    pub position: Vec<i8>,
    pub trades: Vec<Trade>,
    pub metrics: MetricBundle,
}
