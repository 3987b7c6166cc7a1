use serde::{Deserialize, Serialize};

/// One backtest evaluation, keyed by the strategy hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRunRecord {
    pub strategy_name: String,
    pub symbol: String,
    pub interval: String,
    pub params_json: String,
    pub hash_id: String,
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub profit_factor: f64,
    pub var_95: Option<f64>,
    pub ending_equity: f64,
    pub win_rate: f64,
    pub total_trades: i64,
    pub net_profit: f64,
    pub data_range_start: String,
    pub data_range_end: String,
    pub regime: Option<String>,
    pub notes: Option<String>,
}

/// A strategy promoted past stage 5.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WinnerRecord {
    #[sqlx(default)]
    pub id: Option<i64>,
    pub strategy_name: String,
    pub archetype: String,
    pub symbol: String,
    pub interval: String,
    pub sharpe_ratio: f64,
    pub total_return: f64,
    pub net_profit: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_trades: i64,
    pub win_trades: i64,
    pub loss_trades: i64,
    pub avg_trade_pnl: f64,
    pub params_json: String,
    pub monte_carlo_var95: Option<f64>,
    pub permutation_pvalue: Option<f64>,
    pub deflated_sharpe: Option<f64>,
    pub complementarity_score: Option<f64>,
    pub data_range_start: String,
    pub data_range_end: String,
    pub is_active: i64,
    pub hash_id: String,
}

/// Immutable graveyard entry; the hash is never re-tested once present.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GraveyardEntry {
    pub strategy_hash: String,
    pub strategy_name: String,
    pub killed_at_stage: String,
    pub reason: String,
    pub best_sharpe: f64,
    pub total_trades: i64,
}

/// Lifecycle row, one per strategy hash.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LifecycleRow {
    pub strategy_hash: String,
    pub strategy_name: Option<String>,
    pub archetype: Option<String>,
    pub current_stage: String,
    pub s1_passed_at: Option<String>,
    pub s2_passed_at: Option<String>,
    pub s3_passed_at: Option<String>,
    pub s4_passed_at: Option<String>,
    pub s5_passed_at: Option<String>,
    pub degradation_strikes: i64,
    pub rejection_reason: Option<String>,
}

/// One research cycle summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct CycleRow {
    #[sqlx(default)]
    pub id: Option<i64>,
    pub cycle_num: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: f64,
    pub ideas_generated: i64,
    pub backtests_run: i64,
    pub stage1_passed: i64,
    pub stage2_passed: i64,
    pub stage3_passed: i64,
    pub stage4_passed: i64,
    pub stage5_passed: i64,
    pub rejected: i64,
    pub errors: i64,
    pub best_sharpe: Option<f64>,
    pub best_strategy_name: Option<String>,
    pub notes: Option<String>,
}

/// Dashboard projection: cumulative pipeline flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct PipelineCounts {
    pub backtests_run: i64,
    pub stage1_passed: i64,
    pub stage2_passed: i64,
    pub stage3_passed: i64,
    pub stage4_passed: i64,
    pub stage5_passed: i64,
    pub rejected: i64,
    pub deployed: i64,
    pub graveyard: i64,
}

/// Dashboard projection: leaderboard line.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardRow {
    pub strategy_name: String,
    pub sharpe_ratio: f64,
    pub profit_factor: Option<f64>,
    pub win_rate: Option<f64>,
    pub total_trades: Option<i64>,
    pub is_winner: i64,
}
