pub mod models;
pub mod schema;

pub use models::*;

use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Persistent strategy registry over SQLite.
///
/// The daemon is the sole writer; the dashboard reads the same file. Every
/// write is a single statement or transaction, so concurrent readers never
/// observe a partial cycle row.
pub struct Registry {
    pool: SqlitePool,
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

impl Registry {
    /// Open (or create) the registry database at `path`.
    pub async fn connect(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&format!("sqlite://{path}?mode=rwc"))
            .await?;
        let registry = Self { pool };
        registry.init_schema().await?;
        Ok(registry)
    }

    /// In-memory registry for tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let registry = Self { pool };
        registry.init_schema().await?;
        Ok(registry)
    }

    async fn init_schema(&self) -> Result<()> {
        for ddl in schema::TABLES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Backtest runs
    // =========================================================================

    pub async fn upsert_backtest_run(&self, run: &BacktestRunRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO backtest_runs (
                timestamp, strategy_name, symbol, interval, params_json, hash_id,
                total_return, cagr, sharpe_ratio, max_drawdown, max_drawdown_pct,
                profit_factor, var_95, ending_equity, win_rate, total_trades,
                net_profit, data_range_start, data_range_end, regime, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hash_id) DO UPDATE SET
                timestamp = excluded.timestamp,
                total_return = excluded.total_return,
                cagr = excluded.cagr,
                sharpe_ratio = excluded.sharpe_ratio,
                max_drawdown = excluded.max_drawdown,
                max_drawdown_pct = excluded.max_drawdown_pct,
                profit_factor = excluded.profit_factor,
                var_95 = excluded.var_95,
                ending_equity = excluded.ending_equity,
                win_rate = excluded.win_rate,
                total_trades = excluded.total_trades,
                net_profit = excluded.net_profit,
                notes = excluded.notes",
        )
        .bind(now())
        .bind(&run.strategy_name)
        .bind(&run.symbol)
        .bind(&run.interval)
        .bind(&run.params_json)
        .bind(&run.hash_id)
        .bind(run.total_return)
        .bind(run.cagr)
        .bind(run.sharpe_ratio)
        .bind(run.max_drawdown)
        .bind(run.max_drawdown_pct)
        .bind(run.profit_factor)
        .bind(run.var_95)
        .bind(run.ending_equity)
        .bind(run.win_rate)
        .bind(run.total_trades)
        .bind(run.net_profit)
        .bind(&run.data_range_start)
        .bind(&run.data_range_end)
        .bind(&run.regime)
        .bind(&run.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Winners
    // =========================================================================

    /// Insert or refresh a winning strategy. Returns its row id.
    pub async fn upsert_winner(&self, winner: &WinnerRecord) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO winning_strategies (
                timestamp, strategy_name, archetype, symbol, interval,
                sharpe_ratio, total_return, net_profit, max_drawdown,
                max_drawdown_pct, win_rate, profit_factor, total_trades,
                win_trades, loss_trades, avg_trade_pnl, params_json,
                monte_carlo_var95, permutation_pvalue, deflated_sharpe,
                complementarity_score, data_range_start, data_range_end,
                is_active, hash_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hash_id) DO UPDATE SET
                timestamp = excluded.timestamp,
                sharpe_ratio = excluded.sharpe_ratio,
                total_return = excluded.total_return,
                net_profit = excluded.net_profit,
                max_drawdown = excluded.max_drawdown,
                max_drawdown_pct = excluded.max_drawdown_pct,
                win_rate = excluded.win_rate,
                profit_factor = excluded.profit_factor,
                total_trades = excluded.total_trades,
                win_trades = excluded.win_trades,
                loss_trades = excluded.loss_trades,
                avg_trade_pnl = excluded.avg_trade_pnl,
                monte_carlo_var95 = excluded.monte_carlo_var95,
                permutation_pvalue = excluded.permutation_pvalue,
                deflated_sharpe = excluded.deflated_sharpe,
                complementarity_score = excluded.complementarity_score,
                is_active = excluded.is_active
            RETURNING id",
        )
        .bind(now())
        .bind(&winner.strategy_name)
        .bind(&winner.archetype)
        .bind(&winner.symbol)
        .bind(&winner.interval)
        .bind(winner.sharpe_ratio)
        .bind(winner.total_return)
        .bind(winner.net_profit)
        .bind(winner.max_drawdown)
        .bind(winner.max_drawdown_pct)
        .bind(winner.win_rate)
        .bind(winner.profit_factor)
        .bind(winner.total_trades)
        .bind(winner.win_trades)
        .bind(winner.loss_trades)
        .bind(winner.avg_trade_pnl)
        .bind(&winner.params_json)
        .bind(winner.monte_carlo_var95)
        .bind(winner.permutation_pvalue)
        .bind(winner.deflated_sharpe)
        .bind(winner.complementarity_score)
        .bind(&winner.data_range_start)
        .bind(&winner.data_range_end)
        .bind(winner.is_active)
        .bind(&winner.hash_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn active_winners(&self) -> Result<Vec<WinnerRecord>> {
        let rows = sqlx::query_as::<_, WinnerRecord>(
            "SELECT id, strategy_name, archetype, symbol, interval, sharpe_ratio,
                    total_return, net_profit, max_drawdown, max_drawdown_pct,
                    win_rate, profit_factor, total_trades, win_trades, loss_trades,
                    avg_trade_pnl, params_json, monte_carlo_var95,
                    permutation_pvalue, deflated_sharpe, complementarity_score,
                    data_range_start, data_range_end, is_active, hash_id
             FROM winning_strategies WHERE is_active = 1 ORDER BY sharpe_ratio DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn deactivate_winner(&self, hash_id: &str) -> Result<()> {
        sqlx::query("UPDATE winning_strategies SET is_active = 0 WHERE hash_id = ?")
            .bind(hash_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Record a lifecycle transition for a strategy hash.
    ///
    /// Creates the row on first sight. Idempotent: re-recording the stage the
    /// row is already in leaves it untouched.
    pub async fn record_lifecycle_transition(
        &self,
        hash: &str,
        name: &str,
        archetype: &str,
        target_stage: &str,
        metrics_json: Option<&str>,
        rejection_reason: Option<&str>,
    ) -> Result<()> {
        let ts = now();
        sqlx::query(
            "INSERT INTO strategy_lifecycle (strategy_hash, strategy_name, archetype, current_stage, created_at, updated_at)
             VALUES (?, ?, ?, 'CANDIDATE', ?, ?)
             ON CONFLICT(strategy_hash) DO NOTHING",
        )
        .bind(hash)
        .bind(name)
        .bind(archetype)
        .bind(&ts)
        .bind(&ts)
        .execute(&self.pool)
        .await?;

        let (current,): (String,) =
            sqlx::query_as("SELECT current_stage FROM strategy_lifecycle WHERE strategy_hash = ?")
                .bind(hash)
                .fetch_one(&self.pool)
                .await?;
        if current == target_stage {
            return Ok(());
        }

        let stage_col = match target_stage {
            "STAGE1_PASS" => Some(("s1_passed_at", "s1_metrics_json")),
            "STAGE2_PASS" => Some(("s2_passed_at", "s2_metrics_json")),
            "STAGE3_PASS" => Some(("s3_passed_at", "s3_metrics_json")),
            "STAGE4_PASS" => Some(("s4_passed_at", "s4_metrics_json")),
            "STAGE5_PASS" => Some(("s5_passed_at", "s5_metrics_json")),
            _ => None,
        };

        if let Some((at_col, metrics_col)) = stage_col {
            let sql = format!(
                "UPDATE strategy_lifecycle
                 SET current_stage = ?, {at_col} = ?, {metrics_col} = ?, updated_at = ?
                 WHERE strategy_hash = ?"
            );
            sqlx::query(&sql)
                .bind(target_stage)
                .bind(&ts)
                .bind(metrics_json)
                .bind(&ts)
                .bind(hash)
                .execute(&self.pool)
                .await?;
        } else {
            let archived_at = if target_stage == "ARCHIVED" { Some(ts.clone()) } else { None };
            sqlx::query(
                "UPDATE strategy_lifecycle
                 SET current_stage = ?, rejection_reason = COALESCE(?, rejection_reason),
                     archived_at = COALESCE(?, archived_at), updated_at = ?
                 WHERE strategy_hash = ?",
            )
            .bind(target_stage)
            .bind(rejection_reason)
            .bind(archived_at)
            .bind(&ts)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn lifecycle(&self, hash: &str) -> Result<Option<LifecycleRow>> {
        let row = sqlx::query_as::<_, LifecycleRow>(
            "SELECT strategy_hash, strategy_name, archetype, current_stage,
                    s1_passed_at, s2_passed_at, s3_passed_at, s4_passed_at,
                    s5_passed_at, degradation_strikes, rejection_reason
             FROM strategy_lifecycle WHERE strategy_hash = ?",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Add one degradation strike and return the new count.
    pub async fn add_degradation_strike(&self, hash: &str) -> Result<i64> {
        sqlx::query(
            "UPDATE strategy_lifecycle
             SET degradation_strikes = degradation_strikes + 1, updated_at = ?
             WHERE strategy_hash = ?",
        )
        .bind(now())
        .bind(hash)
        .execute(&self.pool)
        .await?;
        let (strikes,): (i64,) = sqlx::query_as(
            "SELECT degradation_strikes FROM strategy_lifecycle WHERE strategy_hash = ?",
        )
        .bind(hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(strikes)
    }

    // =========================================================================
    // Graveyard
    // =========================================================================

    /// Insert a graveyard entry. A hash already present is left untouched —
    /// entries are immutable.
    pub async fn insert_graveyard(&self, entry: &GraveyardEntry) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO strategy_graveyard
             (strategy_hash, strategy_name, killed_at_stage, reason, best_sharpe, total_trades, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.strategy_hash)
        .bind(&entry.strategy_name)
        .bind(&entry.killed_at_stage)
        .bind(&entry.reason)
        .bind(entry.best_sharpe)
        .bind(entry.total_trades)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_graveyarded(&self, hash: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM strategy_graveyard WHERE strategy_hash = ?")
                .bind(hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn graveyard(&self, limit: i64) -> Result<Vec<GraveyardEntry>> {
        let rows = sqlx::query_as::<_, GraveyardEntry>(
            "SELECT strategy_hash, strategy_name, killed_at_stage, reason,
                    best_sharpe, total_trades
             FROM strategy_graveyard ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // =========================================================================
    // Cycle log
    // =========================================================================

    /// Open a cycle row at cycle start; `finalize_cycle` completes it. A crash
    /// between the two leaves an orphan that startup recovery closes out.
    pub async fn open_cycle(&self, cycle_num: i64, started_at: &str) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO cycle_log (cycle_num, started_at) VALUES (?, ?) RETURNING id",
        )
        .bind(cycle_num)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn finalize_cycle(&self, id: i64, summary: &CycleRow) -> Result<()> {
        sqlx::query(
            "UPDATE cycle_log SET
                finished_at = ?, duration_seconds = ?, ideas_generated = ?,
                backtests_run = ?, stage1_passed = ?, stage2_passed = ?,
                stage3_passed = ?, stage4_passed = ?, stage5_passed = ?,
                rejected = ?, errors = ?, best_sharpe = ?,
                best_strategy_name = ?, notes = ?
             WHERE id = ?",
        )
        .bind(summary.finished_at.as_deref().unwrap_or_default())
        .bind(summary.duration_seconds)
        .bind(summary.ideas_generated)
        .bind(summary.backtests_run)
        .bind(summary.stage1_passed)
        .bind(summary.stage2_passed)
        .bind(summary.stage3_passed)
        .bind(summary.stage4_passed)
        .bind(summary.stage5_passed)
        .bind(summary.rejected)
        .bind(summary.errors)
        .bind(summary.best_sharpe)
        .bind(&summary.best_strategy_name)
        .bind(&summary.notes)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a complete cycle row in one statement.
    pub async fn log_cycle(&self, summary: &CycleRow) -> Result<i64> {
        let id = self.open_cycle(summary.cycle_num, &summary.started_at).await?;
        self.finalize_cycle(id, summary).await?;
        Ok(id)
    }

    pub async fn last_cycle(&self) -> Result<Option<CycleRow>> {
        let row = sqlx::query_as::<_, CycleRow>(
            "SELECT id, cycle_num, started_at, finished_at,
                    COALESCE(duration_seconds, 0.0) AS duration_seconds,
                    ideas_generated, backtests_run, stage1_passed, stage2_passed,
                    stage3_passed, stage4_passed, stage5_passed, rejected, errors,
                    best_sharpe, best_strategy_name, notes
             FROM cycle_log ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn recent_cycles(&self, limit: i64) -> Result<Vec<CycleRow>> {
        let rows = sqlx::query_as::<_, CycleRow>(
            "SELECT id, cycle_num, started_at, finished_at,
                    COALESCE(duration_seconds, 0.0) AS duration_seconds,
                    ideas_generated, backtests_run, stage1_passed, stage2_passed,
                    stage3_passed, stage4_passed, stage5_passed, rejected, errors,
                    best_sharpe, best_strategy_name, notes
             FROM cycle_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Strictly monotonic cycle number.
    pub async fn next_cycle_num(&self) -> Result<i64> {
        let (max,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(cycle_num) FROM cycle_log")
                .fetch_one(&self.pool)
                .await?;
        Ok(max.unwrap_or(0) + 1)
    }

    /// Close cycle rows left open by a crash: NULL `finished_at` and started
    /// before `cutoff`. Returns how many were recovered.
    pub async fn cleanup_orphan_cycles(&self, cutoff: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE cycle_log
             SET finished_at = ?, errors = errors + 1, notes = 'recovered after crash'
             WHERE finished_at IS NULL AND started_at < ?",
        )
        .bind(now())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Side-car payloads
    // =========================================================================

    pub async fn write_equity_curve(&self, strategy_id: i64, data_json: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO equity_curves (strategy_id, curve_type, data_json, created_at)
             VALUES (?, 'backtest', ?, ?)",
        )
        .bind(strategy_id)
        .bind(data_json)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn equity_curve(&self, strategy_id: i64) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT data_json FROM equity_curves WHERE strategy_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(strategy_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(j,)| j))
    }

    pub async fn write_trade_log(
        &self,
        strategy_id: i64,
        trades_json: &str,
        total_trades: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO trade_logs (strategy_id, trades_json, total_trades, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(strategy_id)
        .bind(trades_json)
        .bind(total_trades)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_health(&self, status: &str, report_json: &str) -> Result<()> {
        sqlx::query("INSERT INTO system_health (timestamp, status, report_json) VALUES (?, ?, ?)")
            .bind(now())
            .bind(status)
            .bind(report_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Dashboard read projections
    // =========================================================================

    pub async fn pipeline_counts(&self) -> Result<PipelineCounts> {
        let mut counts = sqlx::query_as::<_, PipelineCounts>(
            "SELECT COALESCE(SUM(backtests_run), 0) AS backtests_run,
                    COALESCE(SUM(stage1_passed), 0) AS stage1_passed,
                    COALESCE(SUM(stage2_passed), 0) AS stage2_passed,
                    COALESCE(SUM(stage3_passed), 0) AS stage3_passed,
                    COALESCE(SUM(stage4_passed), 0) AS stage4_passed,
                    COALESCE(SUM(stage5_passed), 0) AS stage5_passed,
                    COALESCE(SUM(rejected), 0) AS rejected,
                    0 AS deployed, 0 AS graveyard
             FROM cycle_log",
        )
        .fetch_one(&self.pool)
        .await?;

        let (deployed,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM winning_strategies WHERE is_active = 1")
                .fetch_one(&self.pool)
                .await?;
        let (graveyard,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM strategy_graveyard")
            .fetch_one(&self.pool)
            .await?;
        counts.deployed = deployed;
        counts.graveyard = graveyard;
        Ok(counts)
    }

    /// Winners first, padded with the best raw backtest runs.
    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardRow>> {
        let mut rows = sqlx::query_as::<_, LeaderboardRow>(
            "SELECT strategy_name, sharpe_ratio, profit_factor, win_rate,
                    total_trades, 1 AS is_winner
             FROM winning_strategies
             ORDER BY sharpe_ratio DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let remaining = limit - rows.len() as i64;
        if remaining > 0 {
            let fill = sqlx::query_as::<_, LeaderboardRow>(
                "SELECT strategy_name, sharpe_ratio, profit_factor, win_rate,
                        total_trades, 0 AS is_winner
                 FROM backtest_runs
                 WHERE hash_id NOT IN (SELECT hash_id FROM winning_strategies)
                 ORDER BY sharpe_ratio DESC LIMIT ?",
            )
            .bind(remaining)
            .fetch_all(&self.pool)
            .await?;
            rows.extend(fill);
        }
        Ok(rows)
    }

    // =========================================================================
    // Messages (dashboard -> daemon guidance)
    // =========================================================================

    /// Queue a guidance message (dashboard side of the contract).
    pub async fn queue_message(&self, message: &str, message_type: &str) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO messages (message, sent_at, message_type) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(message)
        .bind(now())
        .bind(message_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn unacknowledged_messages(&self) -> Result<Vec<(i64, String)>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, message FROM messages WHERE acknowledged = 0 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn acknowledge_message(&self, id: i64, result_notes: &str) -> Result<()> {
        sqlx::query(
            "UPDATE messages SET acknowledged = 1, status = 'applied', applied_at = ?,
                    result_notes = ? WHERE id = ?",
        )
        .bind(now())
        .bind(result_notes)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cycle(num: i64) -> CycleRow {
        CycleRow {
            id: None,
            cycle_num: num,
            started_at: "2026-01-01T12:00:00".to_string(),
            finished_at: Some("2026-01-01T12:03:00".to_string()),
            duration_seconds: 180.0,
            ideas_generated: 10,
            backtests_run: 8,
            stage1_passed: 4,
            stage2_passed: 3,
            stage3_passed: 2,
            stage4_passed: 1,
            stage5_passed: 1,
            rejected: 7,
            errors: 0,
            best_sharpe: Some(1.9),
            best_strategy_name: Some("orb_breakout_NQ_abc123".to_string()),
            notes: None,
        }
    }

    fn sample_winner(hash: &str, sharpe: f64) -> WinnerRecord {
        WinnerRecord {
            id: None,
            strategy_name: format!("orb_breakout_NQ_{hash}"),
            archetype: "orb_breakout".to_string(),
            symbol: "NQ".to_string(),
            interval: "5min".to_string(),
            sharpe_ratio: sharpe,
            total_return: 12.5,
            net_profit: 12_500.0,
            max_drawdown: 4_000.0,
            max_drawdown_pct: 4.0,
            win_rate: 55.0,
            profit_factor: 1.8,
            total_trades: 300,
            win_trades: 165,
            loss_trades: 135,
            avg_trade_pnl: 41.7,
            params_json: "{}".to_string(),
            monte_carlo_var95: Some(-0.08),
            permutation_pvalue: Some(0.01),
            deflated_sharpe: Some(0.97),
            complementarity_score: Some(62.5),
            data_range_start: "2024-01-01".to_string(),
            data_range_end: "2025-12-31".to_string(),
            is_active: 1,
            hash_id: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn log_cycle_round_trips() {
        let registry = Registry::connect_in_memory().await.unwrap();
        let cycle = sample_cycle(1);
        registry.log_cycle(&cycle).await.unwrap();

        let read = registry.last_cycle().await.unwrap().unwrap();
        assert_eq!(read.cycle_num, 1);
        assert_eq!(read.backtests_run, 8);
        assert_eq!(read.stage5_passed, 1);
        assert_eq!(read.best_strategy_name, cycle.best_strategy_name);
        assert_eq!(read.finished_at, cycle.finished_at);
    }

    #[tokio::test]
    async fn cycle_num_is_monotonic() {
        let registry = Registry::connect_in_memory().await.unwrap();
        assert_eq!(registry.next_cycle_num().await.unwrap(), 1);
        registry.log_cycle(&sample_cycle(1)).await.unwrap();
        registry.log_cycle(&sample_cycle(2)).await.unwrap();
        assert_eq!(registry.next_cycle_num().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn lifecycle_transition_is_idempotent() {
        let registry = Registry::connect_in_memory().await.unwrap();
        registry
            .record_lifecycle_transition("h1", "s", "orb_breakout", "STAGE1_PASS", Some("{}"), None)
            .await
            .unwrap();
        let first = registry.lifecycle("h1").await.unwrap().unwrap();

        registry
            .record_lifecycle_transition("h1", "s", "orb_breakout", "STAGE1_PASS", Some("{}"), None)
            .await
            .unwrap();
        let second = registry.lifecycle("h1").await.unwrap().unwrap();

        assert_eq!(first.current_stage, "STAGE1_PASS");
        assert_eq!(first.s1_passed_at, second.s1_passed_at);
    }

    #[tokio::test]
    async fn rejection_records_reason() {
        let registry = Registry::connect_in_memory().await.unwrap();
        registry
            .record_lifecycle_transition(
                "h2",
                "s",
                "ma_crossover",
                "REJECTED",
                None,
                Some("S2 fail: sharpe 0.40 < 1.00"),
            )
            .await
            .unwrap();
        let row = registry.lifecycle("h2").await.unwrap().unwrap();
        assert_eq!(row.current_stage, "REJECTED");
        assert_eq!(row.rejection_reason.as_deref(), Some("S2 fail: sharpe 0.40 < 1.00"));
    }

    #[tokio::test]
    async fn graveyard_is_immutable_and_deduped() {
        let registry = Registry::connect_in_memory().await.unwrap();
        let entry = GraveyardEntry {
            strategy_hash: "dead1".to_string(),
            strategy_name: "x".to_string(),
            killed_at_stage: "S2".to_string(),
            reason: "gauntlet fail".to_string(),
            best_sharpe: 0.3,
            total_trades: 42,
        };
        registry.insert_graveyard(&entry).await.unwrap();
        assert!(registry.is_graveyarded("dead1").await.unwrap());

        // Second insert with a different reason must not overwrite.
        let mut again = entry.clone();
        again.reason = "something else".to_string();
        registry.insert_graveyard(&again).await.unwrap();
        let rows = registry.graveyard(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reason, "gauntlet fail");
        assert!(!registry.is_graveyarded("alive").await.unwrap());
    }

    #[tokio::test]
    async fn winner_upsert_replaces_by_hash() {
        let registry = Registry::connect_in_memory().await.unwrap();
        let id1 = registry.upsert_winner(&sample_winner("w1", 1.5)).await.unwrap();
        let id2 = registry.upsert_winner(&sample_winner("w1", 2.5)).await.unwrap();
        assert_eq!(id1, id2);

        let winners = registry.active_winners().await.unwrap();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].sharpe_ratio, 2.5);

        registry.deactivate_winner("w1").await.unwrap();
        assert!(registry.active_winners().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn orphan_cycles_are_recovered() {
        let registry = Registry::connect_in_memory().await.unwrap();
        registry.open_cycle(1, "2026-01-01T00:00:00").await.unwrap();
        let fresh = registry.open_cycle(2, "2026-02-01T00:00:00").await.unwrap();

        let recovered = registry.cleanup_orphan_cycles("2026-01-15T00:00:00").await.unwrap();
        assert_eq!(recovered, 1);

        let cycles = registry.recent_cycles(10).await.unwrap();
        let orphan = cycles.iter().find(|c| c.cycle_num == 1).unwrap();
        assert!(orphan.finished_at.is_some());
        assert_eq!(orphan.notes.as_deref(), Some("recovered after crash"));
        // The in-flight cycle is untouched.
        let open = cycles.iter().find(|c| c.cycle_num == 2).unwrap();
        assert!(open.finished_at.is_none());
        let _ = fresh;
    }

    #[tokio::test]
    async fn equity_curve_round_trips() {
        let registry = Registry::connect_in_memory().await.unwrap();
        let id = registry.upsert_winner(&sample_winner("w9", 2.0)).await.unwrap();
        registry.write_equity_curve(id, "[100000.0,100500.0]").await.unwrap();
        let curve = registry.equity_curve(id).await.unwrap().unwrap();
        assert_eq!(curve, "[100000.0,100500.0]");
    }

    #[tokio::test]
    async fn leaderboard_pads_with_backtest_runs() {
        let registry = Registry::connect_in_memory().await.unwrap();
        registry.upsert_winner(&sample_winner("w1", 2.0)).await.unwrap();
        registry
            .upsert_backtest_run(&BacktestRunRecord {
                strategy_name: "runner_up".to_string(),
                symbol: "NQ".to_string(),
                interval: "5min".to_string(),
                params_json: "{}".to_string(),
                hash_id: "r1".to_string(),
                total_return: 5.0,
                cagr: 0.05,
                sharpe_ratio: 1.1,
                max_drawdown: 2_000.0,
                max_drawdown_pct: 2.0,
                profit_factor: 1.4,
                var_95: None,
                ending_equity: 105_000.0,
                win_rate: 52.0,
                total_trades: 250,
                net_profit: 5_000.0,
                data_range_start: "2024-01-01".to_string(),
                data_range_end: "2025-12-31".to_string(),
                regime: None,
                notes: None,
            })
            .await
            .unwrap();

        let board = registry.leaderboard(5).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].is_winner, 1);
        assert_eq!(board[1].strategy_name, "runner_up");
    }

    #[tokio::test]
    async fn messages_queue_and_acknowledge() {
        let registry = Registry::connect_in_memory().await.unwrap();
        let id = registry
            .queue_message("hunt lunch-hour fades", "user_guidance")
            .await
            .unwrap();

        let pending = registry.unacknowledged_messages().await.unwrap();
        assert_eq!(pending, vec![(id, "hunt lunch-hour fades".to_string())]);

        registry.acknowledge_message(id, "applied").await.unwrap();
        assert!(registry.unacknowledged_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pipeline_counts_funnel_is_monotone() {
        let registry = Registry::connect_in_memory().await.unwrap();
        registry.log_cycle(&sample_cycle(1)).await.unwrap();
        registry.log_cycle(&sample_cycle(2)).await.unwrap();

        let counts = registry.pipeline_counts().await.unwrap();
        assert_eq!(counts.backtests_run, 16);
        assert!(counts.backtests_run >= counts.stage1_passed);
        assert!(counts.stage1_passed >= counts.stage2_passed);
        assert!(counts.stage2_passed >= counts.stage3_passed);
        assert!(counts.stage3_passed >= counts.stage4_passed);
        assert!(counts.stage4_passed >= counts.stage5_passed);
    }
}
