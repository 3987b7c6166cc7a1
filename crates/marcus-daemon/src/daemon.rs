use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tokio::signal::unix::{signal, SignalKind};

use market_data::{BarStore, BarTable};
use pipeline::{ReferencePortfolio, ResearchPipeline};
use registry::{CycleRow, Registry};

use crate::config::MarcusConfig;
use crate::idea_client::{FallbackIdeaSource, GridIdeaSource, LlmIdeaSource};
use crate::state::{DaemonState, StateFile};

const POLL_INTERVAL_SECS: u64 = 30;
const ERROR_BACKOFF_SECS: u64 = 60;
const SLOW_CYCLE_THRESHOLD_SECS: f64 = 600.0;
const STALE_HEARTBEAT_SECS: i64 = 1800;
const GRID_BATCH_SIZE: usize = 8;

fn now_string() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// What one scheduler iteration decided to do.
#[derive(Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Stopped,
    Paused,
    Ran,
}

/// The 24/7 research daemon: schedules cycles, dashboard refreshes and
/// heartbeats; owns the registry and the persisted state file.
pub struct MarcusDaemon {
    config: MarcusConfig,
    registry: Registry,
    pipeline: ResearchPipeline,
    ideas: FallbackIdeaSource,
    state_file: StateFile,
    state: DaemonState,
    bar_store: BarStore,
    bars: BarTable,
    cycle_running: bool,
    last_cycle_duration: Option<f64>,
}

impl MarcusDaemon {
    /// Build the daemon. A missing bar table for the configured symbol is a
    /// fatal startup error.
    pub async fn new(config: MarcusConfig) -> Result<Self> {
        for dir in [&config.logs_dir, &config.reports_dir] {
            std::fs::create_dir_all(dir).ok();
        }

        let registry = Registry::connect(&config.db_path)
            .await
            .with_context(|| format!("cannot open registry at {}", config.db_path))?;

        let bar_store = BarStore::new(&config.data_dir);
        let bars = bar_store
            .load(&config.symbol, &config.interval)
            .with_context(|| {
                format!(
                    "bar store is missing {}/{} under {}",
                    config.symbol, config.interval, config.data_dir
                )
            })?;

        let pipeline = ResearchPipeline::new(
            backtest_engine::VectorEngine::new(config.engine_config()),
            config.pipeline_config(),
            ReferencePortfolio::default(),
        );

        let llm = if config.idea_source_enabled {
            Some(LlmIdeaSource::new(
                &config.idea_source_url,
                &config.idea_source_model,
                &config.symbol,
                &config.interval,
            ))
        } else {
            None
        };
        let ideas = FallbackIdeaSource {
            llm,
            grid: GridIdeaSource::new(&config.symbol, &config.interval, GRID_BATCH_SIZE),
        };

        let state_file = StateFile::new(&config.state_file);
        let state = state_file.load();

        Ok(Self {
            config,
            registry,
            pipeline,
            ideas,
            state_file,
            state,
            bar_store,
            bars,
            cycle_running: false,
            last_cycle_duration: None,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> &DaemonState {
        &self.state
    }

    // =========================================================================
    // Startup checks
    // =========================================================================

    /// Preflight: each failure is a warning with documented degradation,
    /// never fatal.
    pub async fn preflight(&self) {
        let workers = rayon::current_num_threads();
        tracing::info!(workers, "backtest worker pool ready");

        let data_ok = self.bar_store.has_any_data();
        if !data_ok {
            tracing::warn!(
                data_dir = %self.config.data_dir,
                "data directory has no CSV files; cycles will reuse the cached bar table"
            );
        }

        let mut idea_source_ok = None;
        if let Some(llm) = &self.ideas.llm {
            let healthy = llm.healthy().await;
            idea_source_ok = Some(healthy);
            if healthy {
                tracing::info!(url = %self.config.idea_source_url, "idea source reachable");
            } else {
                tracing::warn!(
                    url = %self.config.idea_source_url,
                    "idea source unreachable; falling back to the parametric grid"
                );
            }
        }

        let report = serde_json::json!({
            "workers": workers,
            "data_ok": data_ok,
            "idea_source_ok": idea_source_ok,
            "bars_loaded": self.bars.len(),
        });
        self.registry
            .log_health("preflight", &report.to_string())
            .await
            .ok();
    }

    // =========================================================================
    // Main loop
    // =========================================================================

    /// Continuous mode. Returns when `stopped` is set (dashboard flag or
    /// signal).
    pub async fn run(&mut self) -> Result<()> {
        self.state.started_at = Some(now_string());
        // An explicit start clears any leftover control flags.
        self.state.paused = false;
        self.state.stopped = false;
        self.state_file.save(&self.state, Some((false, false)))?;

        // Crash recovery: close out cycle rows that never finished.
        let cutoff = (chrono::Utc::now()
            - chrono::Duration::minutes(2 * self.config.cycle_interval_minutes as i64))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();
        match self.registry.cleanup_orphan_cycles(&cutoff).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(recovered = n, "closed orphan cycle rows from a previous crash"),
            Err(err) => tracing::error!(error = %err, "orphan cycle cleanup failed"),
        }

        self.preflight().await;
        self.dashboard_refresh().ok();

        tracing::info!(
            cycle_every_min = self.config.cycle_interval_minutes,
            dashboard_every_min = self.config.dashboard_refresh_minutes,
            "entering main loop"
        );

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            let outcome = match self.tick(chrono::Utc::now().naive_utc()).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.cycle_running = false;
                    self.state.total_errors += 1;
                    tracing::error!(error = %err, "main loop error, backing off");
                    self.state_file.save(&self.state, None).ok();
                    tokio::time::sleep(std::time::Duration::from_secs(ERROR_BACKOFF_SECS)).await;
                    continue;
                }
            };
            if outcome == TickOutcome::Stopped {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(POLL_INTERVAL_SECS)) => {}
                _ = sigint.recv() => {
                    tracing::info!("SIGINT received, shutting down");
                    self.shutdown().await;
                    break;
                }
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received, shutting down");
                    self.shutdown().await;
                    break;
                }
            }
        }

        tracing::info!("main loop exited");
        Ok(())
    }

    /// One scheduler iteration: reread control flags, then run whichever of
    /// cycle / dashboard / heartbeat is due. Split from `run` so scheduling
    /// decisions are testable without sleeping.
    pub async fn tick(&mut self, now: NaiveDateTime) -> Result<TickOutcome> {
        // The state file is authoritative for dashboard-owned fields.
        let disk = self.state_file.load();
        let was_paused = self.state.paused;
        self.state.paused = disk.paused;
        self.state.stopped = disk.stopped;
        self.state.guide_text = disk.guide_text;
        self.state.directive = disk.directive;
        self.state.exploration_mode = disk.exploration_mode;
        self.state.active_objective = disk.active_objective;
        self.state.active_preset_id = disk.active_preset_id;

        if self.state.stopped {
            tracing::info!("stop flag detected in state file");
            return Ok(TickOutcome::Stopped);
        }
        if self.state.paused {
            if !was_paused {
                tracing::info!("pause flag detected in state file");
            }
            // Heartbeat continues while paused so the dashboard shows PAUSED
            // rather than OFFLINE.
            if due(self.state.last_heartbeat_at.as_ref(), now, self.config.health_check_minutes) {
                self.heartbeat().await;
            }
            self.state_file.save(&self.state, None)?;
            return Ok(TickOutcome::Paused);
        }
        if was_paused {
            tracing::info!("resume detected in state file");
        }

        if !self.cycle_running
            && due(self.state.last_cycle_at.as_ref(), now, self.config.cycle_interval_minutes)
        {
            self.cycle_running = true;
            self.research_cycle().await;
            self.cycle_running = false;
        }

        if due(
            self.state.last_dashboard_at.as_ref(),
            now,
            self.config.dashboard_refresh_minutes,
        ) {
            if let Err(err) = self.dashboard_refresh() {
                tracing::error!(error = %err, "dashboard refresh failed");
            }
        }

        if due(self.state.last_heartbeat_at.as_ref(), now, self.config.health_check_minutes) {
            self.heartbeat().await;
        }

        if let Some(last) = &self.state.last_heartbeat_at {
            if let Ok(last_dt) = NaiveDateTime::parse_from_str(last, "%Y-%m-%dT%H:%M:%S") {
                let age = (now - last_dt).num_seconds();
                if age > STALE_HEARTBEAT_SECS {
                    tracing::warn!(age_secs = age, "stale heartbeat");
                }
            }
        }

        self.state_file.save(&self.state, None)?;
        Ok(TickOutcome::Ran)
    }

    // =========================================================================
    // Scheduled work
    // =========================================================================

    /// Execute one research cycle. Cycle-level failures are tallied, never
    /// propagated — the control loop must survive every cycle outcome.
    async fn research_cycle(&mut self) {
        tracing::info!("starting research cycle");
        let t0 = Instant::now();

        // Pick up freshly downloaded data; keep the cached table when the
        // reload fails.
        match self.bar_store.load(&self.config.symbol, &self.config.interval) {
            Ok(bars) => self.bars = bars,
            Err(err) => {
                tracing::warn!(error = %err, "bar reload failed, using cached table");
            }
        }

        match self.run_cycle_inner().await {
            Ok(summary) => {
                self.state.last_cycle_at = Some(now_string());
                self.state.total_cycles += 1;
                self.state.total_errors += summary.errors as u64;
                if summary.errors > 0 {
                    tracing::warn!(errors = summary.errors, "cycle finished with internal errors");
                }
            }
            Err(err) => {
                self.state.total_errors += 1;
                tracing::error!(error = %err, "research cycle failed");
                self.registry
                    .log_health("cycle_error", &format!("{{\"error\":{:?}}}", err.to_string()))
                    .await
                    .ok();
            }
        }

        let elapsed = t0.elapsed().as_secs_f64();
        self.last_cycle_duration = Some(elapsed);
        if elapsed > SLOW_CYCLE_THRESHOLD_SECS {
            tracing::warn!(elapsed_secs = elapsed as u64, "slow cycle");
            self.registry
                .log_health("slow_cycle", &format!("{{\"elapsed_seconds\":{elapsed:.0}}}"))
                .await
                .ok();
        }

        self.dashboard_refresh().ok();
        self.state_file.save(&self.state, None).ok();
    }

    async fn run_cycle_inner(&self) -> Result<CycleRow> {
        // Fold queued dashboard guidance into this cycle's directive.
        let mut directive = self.state.directive.clone();
        for (id, message) in self.registry.unacknowledged_messages().await? {
            tracing::info!(id, message = %message, "applying queued guidance");
            directive = Some(match directive.take() {
                Some(existing) => format!("{existing}; {message}"),
                None => message.clone(),
            });
            self.registry
                .acknowledge_message(id, "applied to cycle directive")
                .await?;
        }

        let cycle_num = self.registry.next_cycle_num().await?;
        let summary = self
            .pipeline
            .run_cycle(
                &self.registry,
                &self.ideas,
                &self.bars,
                cycle_num,
                directive.as_deref(),
            )
            .await?;

        let (struck, archived) = self
            .pipeline
            .revalidate_deployed(&self.registry, &self.bars)
            .await?;
        if struck > 0 {
            tracing::warn!(struck, archived, "deployed strategies degraded this cycle");
        }
        Ok(summary)
    }

    /// Execute exactly one cycle (for `--once`). Unlike continuous mode the
    /// error propagates, mapping to exit code 2.
    pub async fn run_once(&mut self) -> Result<CycleRow> {
        self.preflight().await;
        let summary = self.run_cycle_inner().await?;
        self.state.last_cycle_at = Some(now_string());
        self.state.total_cycles += 1;
        self.state.total_errors += summary.errors as u64;
        self.state_file.save(&self.state, None)?;
        self.dashboard_refresh()?;
        Ok(summary)
    }

    /// Signal the dashboard collaborator that fresh projections are
    /// available: a refresh marker next to the dashboard artifact.
    pub fn dashboard_refresh(&mut self) -> Result<()> {
        let marker = std::path::Path::new(&self.config.reports_dir).join("dashboard.refresh");
        std::fs::write(&marker, now_string())
            .with_context(|| format!("cannot write refresh marker {}", marker.display()))?;
        self.state.last_dashboard_at = Some(now_string());
        Ok(())
    }

    async fn heartbeat(&mut self) {
        self.state.last_heartbeat_at = Some(now_string());
        let report = serde_json::json!({
            "total_cycles": self.state.total_cycles,
            "total_errors": self.state.total_errors,
            "paused": self.state.paused,
            "last_cycle_duration_secs": self.last_cycle_duration,
        });
        self.registry
            .log_health("heartbeat", &report.to_string())
            .await
            .ok();
    }

    async fn shutdown(&mut self) {
        self.state.stopped = true;
        self.state.paused = false;
        self.state_file.save(&self.state, Some((false, true))).ok();
        let report = serde_json::json!({
            "total_cycles": self.state.total_cycles,
            "total_errors": self.state.total_errors,
            "started_at": self.state.started_at,
        });
        self.registry
            .log_health("shutdown", &report.to_string())
            .await
            .ok();
        self.dashboard_refresh().ok();
    }
}

/// True when `last` is absent, unparseable, or at least `interval_minutes`
/// old.
fn due(last: Option<&String>, now: NaiveDateTime, interval_minutes: u64) -> bool {
    match last {
        None => true,
        Some(raw) => match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            Ok(last_dt) => (now - last_dt).num_minutes() >= interval_minutes as i64,
            Err(_) => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn minutes_ago(now: NaiveDateTime, minutes: i64) -> String {
        (now - chrono::Duration::minutes(minutes))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    #[test]
    fn due_handles_missing_and_stale_and_fresh() {
        let now = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert!(due(None, now, 240));
        assert!(due(Some(&minutes_ago(now, 241)), now, 240));
        assert!(!due(Some(&minutes_ago(now, 239)), now, 240));
        assert!(due(Some(&"garbage".to_string()), now, 240));
    }

    /// Two quiet RTH days of 5-minute bars as CSV text.
    fn fixture_csv() -> String {
        let mut csv = String::from("timestamp,open,high,low,close,volume\n");
        for day in [2, 3] {
            let mut minute = 9 * 60 + 30;
            let mut k = 0;
            while minute <= 15 * 60 + 45 {
                let w = if k % 2 == 0 { 0.5 } else { -0.5 };
                let c = 100.0 + w;
                csv.push_str(&format!(
                    "2024-01-{day:02} {:02}:{:02}:00,{c},{},{},{c},1000\n",
                    minute / 60,
                    minute % 60,
                    c + 1.0,
                    c - 1.0,
                ));
                minute += 5;
                k += 1;
            }
        }
        csv
    }

    async fn fixture_daemon(dir: &tempfile::TempDir) -> MarcusDaemon {
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join("NQ_5min.csv"), fixture_csv()).unwrap();

        let config = MarcusConfig {
            db_path: dir.path().join("registry.db").display().to_string(),
            data_dir: data_dir.display().to_string(),
            logs_dir: dir.path().join("logs").display().to_string(),
            reports_dir: dir.path().join("reports").display().to_string(),
            state_file: dir.path().join("logs/state.json").display().to_string(),
            cycle_interval_minutes: 0, // always due
            dashboard_refresh_minutes: 0,
            health_check_minutes: 0,
            n_mc: 20,
            n_perm: 10,
            ..MarcusConfig::default()
        };
        MarcusDaemon::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn paused_daemon_heartbeats_but_never_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = fixture_daemon(&dir).await;
        // Dashboard pauses us before the first tick.
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join("logs/state.json"), r#"{"paused": true}"#).unwrap();

        let now = chrono::Utc::now().naive_utc();
        for i in 0..3 {
            let outcome = daemon
                .tick(now + chrono::Duration::minutes(i * 240))
                .await
                .unwrap();
            assert_eq!(outcome, TickOutcome::Paused);
        }

        // Three cycle intervals elapsed: no cycle rows, heartbeat alive.
        assert!(daemon.registry().recent_cycles(10).await.unwrap().is_empty());
        assert!(daemon.state().last_heartbeat_at.is_some());
        assert_eq!(daemon.state().total_cycles, 0);
    }

    #[tokio::test]
    async fn stop_flag_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = fixture_daemon(&dir).await;
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join("logs/state.json"), r#"{"stopped": true}"#).unwrap();

        let outcome = daemon.tick(chrono::Utc::now().naive_utc()).await.unwrap();
        assert_eq!(outcome, TickOutcome::Stopped);
    }

    #[tokio::test]
    async fn running_tick_executes_a_cycle_and_saves_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = fixture_daemon(&dir).await;

        let outcome = daemon.tick(chrono::Utc::now().naive_utc()).await.unwrap();
        assert_eq!(outcome, TickOutcome::Ran);

        let cycles = daemon.registry().recent_cycles(10).await.unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].cycle_num, 1);
        assert!(cycles[0].finished_at.is_some());
        assert_eq!(daemon.state().total_cycles, 1);

        // State file persisted with daemon metrics.
        let text = std::fs::read_to_string(dir.path().join("logs/state.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["total_cycles"], 1);
        assert!(doc["last_cycle_at"].is_string());

        // Dashboard refresh marker written.
        assert!(dir.path().join("reports/dashboard.refresh").exists());
    }

    #[tokio::test]
    async fn directive_flows_from_state_file_into_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = fixture_daemon(&dir).await;
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(
            dir.path().join("logs/state.json"),
            r#"{"directive": "focus overnight", "paused": true}"#,
        )
        .unwrap();

        daemon.tick(chrono::Utc::now().naive_utc()).await.unwrap();
        assert_eq!(daemon.state().directive.as_deref(), Some("focus overnight"));
    }
}
