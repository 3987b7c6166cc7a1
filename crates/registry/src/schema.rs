//! Registry table definitions, applied idempotently at pool init.

pub const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS backtest_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT DEFAULT (datetime('now')),
        strategy_name TEXT, symbol TEXT, interval TEXT, params_json TEXT,
        total_return REAL, cagr REAL, sharpe_ratio REAL, max_drawdown REAL,
        profit_factor REAL, var_95 REAL, ending_equity REAL,
        data_range_start TEXT, data_range_end TEXT, regime TEXT, notes TEXT,
        hash_id TEXT UNIQUE,
        max_drawdown_pct REAL, win_rate REAL, total_trades INTEGER, net_profit REAL
    )",
    "CREATE TABLE IF NOT EXISTS winning_strategies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT DEFAULT (datetime('now')),
        strategy_name TEXT NOT NULL, archetype TEXT, symbol TEXT, interval TEXT,
        sharpe_ratio REAL, total_return REAL, net_profit REAL,
        max_drawdown REAL, max_drawdown_pct REAL, win_rate REAL,
        profit_factor REAL, total_trades INTEGER, win_trades INTEGER,
        loss_trades INTEGER, avg_trade_pnl REAL, params_json TEXT,
        monte_carlo_var95 REAL, permutation_pvalue REAL, deflated_sharpe REAL,
        complementarity_score REAL,
        data_range_start TEXT, data_range_end TEXT, notes TEXT,
        is_active INTEGER DEFAULT 1,
        hash_id TEXT UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS equity_curves (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        strategy_id INTEGER NOT NULL, curve_type TEXT DEFAULT 'backtest',
        data_json TEXT NOT NULL, created_at TEXT DEFAULT (datetime('now')),
        FOREIGN KEY (strategy_id) REFERENCES winning_strategies(id)
    )",
    "CREATE TABLE IF NOT EXISTS trade_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        strategy_id INTEGER NOT NULL, trades_json TEXT NOT NULL,
        total_trades INTEGER, created_at TEXT DEFAULT (datetime('now')),
        FOREIGN KEY (strategy_id) REFERENCES winning_strategies(id)
    )",
    "CREATE TABLE IF NOT EXISTS strategy_lifecycle (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        strategy_hash TEXT NOT NULL UNIQUE, strategy_name TEXT,
        archetype TEXT, current_stage TEXT DEFAULT 'CANDIDATE',
        s1_passed_at TEXT, s1_metrics_json TEXT,
        s2_passed_at TEXT, s2_metrics_json TEXT,
        s3_passed_at TEXT, s3_metrics_json TEXT,
        s4_passed_at TEXT, s4_metrics_json TEXT,
        s5_passed_at TEXT, s5_metrics_json TEXT,
        degradation_strikes INTEGER DEFAULT 0, rejection_reason TEXT,
        archived_at TEXT, created_at TEXT DEFAULT (datetime('now')),
        updated_at TEXT DEFAULT (datetime('now'))
    )",
    "CREATE TABLE IF NOT EXISTS strategy_graveyard (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        strategy_hash TEXT UNIQUE NOT NULL, strategy_name TEXT,
        killed_at_stage TEXT, reason TEXT, best_sharpe REAL,
        total_trades INTEGER, created_at TEXT DEFAULT (datetime('now'))
    )",
    "CREATE TABLE IF NOT EXISTS cycle_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cycle_num INTEGER, started_at TEXT, finished_at TEXT,
        duration_seconds REAL, ideas_generated INTEGER DEFAULT 0,
        backtests_run INTEGER DEFAULT 0, stage1_passed INTEGER DEFAULT 0,
        stage2_passed INTEGER DEFAULT 0, stage3_passed INTEGER DEFAULT 0,
        stage4_passed INTEGER DEFAULT 0, stage5_passed INTEGER DEFAULT 0,
        rejected INTEGER DEFAULT 0, errors INTEGER DEFAULT 0,
        best_sharpe REAL, best_strategy_name TEXT, notes TEXT
    )",
    "CREATE TABLE IF NOT EXISTS system_health (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT DEFAULT (datetime('now')),
        status TEXT, report_json TEXT
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        message TEXT NOT NULL, sent_at TEXT DEFAULT (datetime('now')),
        acknowledged INTEGER DEFAULT 0, message_type TEXT DEFAULT 'user_guidance',
        status TEXT DEFAULT 'queued', applied_at TEXT, result_notes TEXT
    )",
];
