use std::collections::HashSet;
use std::time::Instant;

use rayon::prelude::*;

use backtest_engine::{
    deflated_sharpe_ratio, monte_carlo_var95, permutation_pvalue, BacktestResult, MetricBundle,
    VectorEngine,
};
use market_data::BarTable;
use registry::{BacktestRunRecord, CycleRow, GraveyardEntry, Registry, WinnerRecord};
use strategy_kernels::{
    generate_signals, lookup, resolve_time_window, validate_spec, ParamValue, StrategySpec,
};

use crate::complement::{complementarity_score, ReferencePortfolio};
use crate::gates::{self, PipelineConfig};
use crate::ideas::IdeaSource;

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Drives one research cycle: idea intake, graveyard dedup, parallel
/// backtests, staged gating S1-S5, and registry persistence.
pub struct ResearchPipeline {
    engine: VectorEngine,
    config: PipelineConfig,
    reference: ReferencePortfolio,
}

impl ResearchPipeline {
    pub fn new(
        engine: VectorEngine,
        config: PipelineConfig,
        reference: ReferencePortfolio,
    ) -> Self {
        Self {
            engine,
            config,
            reference,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one full cycle and persist its summary. Per-candidate failures
    /// are absorbed into the summary counters; only registry-level faults
    /// propagate.
    pub async fn run_cycle(
        &self,
        registry: &Registry,
        ideas: &dyn IdeaSource,
        bars: &BarTable,
        cycle_num: i64,
        directive: Option<&str>,
    ) -> anyhow::Result<CycleRow> {
        let started = Instant::now();
        let started_at = now();
        let cycle_id = registry.open_cycle(cycle_num, &started_at).await?;

        let mut summary = CycleRow {
            cycle_num,
            started_at: started_at.clone(),
            ..CycleRow::default()
        };

        let menu = strategy_kernels::menu();
        let batch = match ideas.generate(directive, &menu).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(error = %err, "idea source failed, retrying once");
                match ideas.generate(directive, &menu).await {
                    Ok(batch) => batch,
                    Err(err) => {
                        tracing::warn!(error = %err, "idea source failed twice, zero ideas this cycle");
                        summary.errors += 1;
                        Vec::new()
                    }
                }
            }
        };
        summary.ideas_generated = batch.len() as i64;

        // Intake filter: dedup within the batch, reject malformed specs,
        // skip anything already in the graveyard.
        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<(StrategySpec, String)> = Vec::new();
        for spec in batch {
            let hash = spec.hash_id();
            if !seen.insert(hash.clone()) {
                continue;
            }
            if spec.symbol != bars.symbol() || spec.interval != bars.interval() {
                summary.rejected += 1;
                self.reject(
                    registry,
                    &spec,
                    &hash,
                    "VALIDATION",
                    format!(
                        "input error: spec targets {}/{} but cycle data is {}/{}",
                        spec.symbol,
                        spec.interval,
                        bars.symbol(),
                        bars.interval()
                    ),
                    None,
                )
                .await?;
                continue;
            }
            if let Err(err) = validate_spec(&spec) {
                summary.rejected += 1;
                self.reject(
                    registry,
                    &spec,
                    &hash,
                    "VALIDATION",
                    format!("input error: {err}"),
                    None,
                )
                .await?;
                continue;
            }
            if registry.is_graveyarded(&hash).await? {
                tracing::debug!(hash = %hash, "graveyard hit, skipping");
                summary.rejected += 1;
                continue;
            }
            candidates.push((spec, hash));
        }

        let num_trials = candidates.len().max(1);

        // Backtests fan out across candidates; each evaluation is pure over
        // (spec, bars) so the worker pool shares nothing mutable.
        let evaluations: Vec<Result<(Vec<i8>, BacktestResult), String>> = candidates
            .par_iter()
            .map(|(spec, _)| {
                let signals = generate_signals(spec, bars).map_err(|e| e.to_string())?;
                let result = self.engine.run(bars, &signals).map_err(|e| e.to_string())?;
                Ok((signals, result))
            })
            .collect();

        let mut best_sharpe = f64::MIN;
        for ((spec, hash), evaluation) in candidates.iter().zip(evaluations) {
            summary.backtests_run += 1;
            let (signals, result) = match evaluation {
                Ok(ok) => ok,
                Err(detail) => {
                    summary.rejected += 1;
                    summary.errors += 1;
                    self.reject(
                        registry,
                        spec,
                        hash,
                        "EVALUATION",
                        format!("evaluation error: {detail}"),
                        None,
                    )
                    .await?;
                    continue;
                }
            };

            self.persist_run(registry, spec, hash, bars, &result).await?;
            if result.metrics.sharpe > best_sharpe {
                best_sharpe = result.metrics.sharpe;
                summary.best_sharpe = Some(result.metrics.sharpe);
                summary.best_strategy_name = Some(spec.display_name());
            }

            // Registry faults propagate; candidate-level failures are folded
            // into the summary inside the gauntlet.
            self.gauntlet(registry, spec, hash, bars, &signals, result, num_trials, &mut summary)
                .await?;
        }

        summary.finished_at = Some(now());
        summary.duration_seconds = started.elapsed().as_secs_f64();
        registry.finalize_cycle(cycle_id, &summary).await?;
        tracing::info!(
            cycle_num,
            ideas = summary.ideas_generated,
            backtests = summary.backtests_run,
            deployed = summary.stage5_passed,
            rejected = summary.rejected,
            errors = summary.errors,
            "cycle complete"
        );
        Ok(summary)
    }

    /// Stages S1-S5 for one evaluated candidate.
    #[allow(clippy::too_many_arguments)]
    async fn gauntlet(
        &self,
        registry: &Registry,
        spec: &StrategySpec,
        hash: &str,
        bars: &BarTable,
        signals: &[i8],
        result: BacktestResult,
        num_trials: usize,
        summary: &mut CycleRow,
    ) -> anyhow::Result<()> {
        let cfg = &self.config;
        let mut metrics = result.metrics.clone();

        // S1 — viability.
        if let Err(reason) = gates::stage1(&metrics, cfg) {
            summary.rejected += 1;
            return self.reject(registry, spec, hash, "S1", reason, Some(&metrics)).await;
        }
        self.advance(registry, spec, hash, "STAGE1_PASS", &metrics).await?;
        summary.stage1_passed += 1;

        // S2 — gauntlet.
        if let Err(reason) = gates::stage2(&metrics, cfg) {
            summary.rejected += 1;
            return self.reject(registry, spec, hash, "S2", reason, Some(&metrics)).await;
        }
        self.advance(registry, spec, hash, "STAGE2_PASS", &metrics).await?;
        summary.stage2_passed += 1;

        // S3 — parameter-neighborhood robustness.
        let median_sharpe = self.perturbation_median(spec, bars, metrics.sharpe);
        if let Err(reason) = gates::stage3(median_sharpe, cfg) {
            summary.rejected += 1;
            return self.reject(registry, spec, hash, "S3", reason, Some(&metrics)).await;
        }
        self.advance(registry, spec, hash, "STAGE3_PASS", &metrics).await?;
        summary.stage3_passed += 1;

        // S4 — statistical audit (the expensive metrics are computed here,
        // only for strategies that earned them).
        metrics.monte_carlo_var95 =
            monte_carlo_var95(&result.trades, self.engine.config().initial_capital, cfg.n_mc);
        metrics.permutation_pvalue =
            permutation_pvalue(&self.engine, bars, signals, metrics.sharpe, cfg.n_perm)?;
        metrics.deflated_sharpe =
            Some(deflated_sharpe_ratio(&result.net_returns, num_trials).probability);

        if let Err(reason) = gates::stage4(&metrics, cfg) {
            summary.rejected += 1;
            return self.reject(registry, spec, hash, "S4", reason, Some(&metrics)).await;
        }
        self.advance(registry, spec, hash, "STAGE4_PASS", &metrics).await?;
        summary.stage4_passed += 1;

        // S5 — portfolio fit.
        let regime = lookup(&spec.archetype).map(|info| info.regime);
        let breakdown = complementarity_score(
            regime.unwrap_or(strategy_kernels::Regime::Mixed),
            resolve_time_window(spec),
            &self.reference,
        );
        let graveyarded = registry.is_graveyarded(hash).await?;
        let s5 = if graveyarded {
            Err("S5 fail: hash present in graveyard".to_string())
        } else {
            gates::stage5(breakdown.score, cfg)
        };
        if let Err(reason) = s5 {
            summary.rejected += 1;
            return self.reject(registry, spec, hash, "S5", reason, Some(&metrics)).await;
        }
        self.advance(registry, spec, hash, "STAGE5_PASS", &metrics).await?;
        summary.stage5_passed += 1;

        // Promotion: registry write makes it DEPLOYED.
        let winner_id = registry
            .upsert_winner(&self.winner_record(spec, hash, bars, &metrics, breakdown.score))
            .await?;
        registry
            .write_equity_curve(winner_id, &serde_json::to_string(&result.equity_curve)?)
            .await?;
        registry
            .write_trade_log(
                winner_id,
                &serde_json::to_string(&result.trades)?,
                metrics.total_trades,
            )
            .await?;
        registry
            .record_lifecycle_transition(
                hash,
                &spec.display_name(),
                &spec.archetype,
                "DEPLOYED",
                None,
                None,
            )
            .await?;
        tracing::info!(
            strategy = %spec.display_name(),
            sharpe = metrics.sharpe,
            complementarity = breakdown.score,
            "strategy deployed"
        );
        Ok(())
    }

    /// Re-run every deployed strategy against current data and re-check the
    /// S2 gauntlet. A failure adds a degradation strike; reaching the strike
    /// limit archives the strategy. Returns (struck, archived).
    pub async fn revalidate_deployed(
        &self,
        registry: &Registry,
        bars: &BarTable,
    ) -> anyhow::Result<(usize, usize)> {
        let mut struck = 0;
        let mut archived = 0;

        for winner in registry.active_winners().await? {
            let params: std::collections::BTreeMap<String, ParamValue> =
                serde_json::from_str(&winner.params_json).unwrap_or_default();
            let spec = StrategySpec {
                archetype: winner.archetype.clone(),
                symbol: winner.symbol.clone(),
                interval: winner.interval.clone(),
                params,
            };

            let verdict = generate_signals(&spec, bars)
                .map_err(|e| e.to_string())
                .and_then(|signals| self.engine.run(bars, &signals).map_err(|e| e.to_string()))
                .and_then(|result| gates::stage2(&result.metrics, &self.config));

            if let Err(reason) = verdict {
                let strikes = registry.add_degradation_strike(&winner.hash_id).await?;
                struck += 1;
                tracing::warn!(
                    strategy = %winner.strategy_name,
                    strikes,
                    reason = %reason,
                    "deployed strategy degraded"
                );
                if strikes >= self.config.max_strikes {
                    registry
                        .record_lifecycle_transition(
                            &winner.hash_id,
                            &winner.strategy_name,
                            &winner.archetype,
                            "ARCHIVED",
                            None,
                            Some(&format!("degradation strikes {strikes}: {reason}")),
                        )
                        .await?;
                    registry.deactivate_winner(&winner.hash_id).await?;
                    archived += 1;
                }
            }
        }
        Ok((struck, archived))
    }

    /// Median Sharpe over the ±delta neighborhood of every numeric param.
    /// A spec with no numeric params keeps its base Sharpe.
    fn perturbation_median(&self, spec: &StrategySpec, bars: &BarTable, base_sharpe: f64) -> f64 {
        let variants = perturbed_specs(spec, self.config.s3_perturbation_delta);
        if variants.is_empty() {
            return base_sharpe;
        }
        let mut sharpes: Vec<f64> = variants
            .par_iter()
            .map(|variant| {
                generate_signals(variant, bars)
                    .ok()
                    .and_then(|signals| self.engine.run(bars, &signals).ok())
                    .map(|r| r.metrics.sharpe)
                    // A neighborhood point that fails to evaluate counts as
                    // zero edge, not as a skipped sample.
                    .unwrap_or(0.0)
            })
            .collect();
        gates::median(&mut sharpes)
    }

    async fn persist_run(
        &self,
        registry: &Registry,
        spec: &StrategySpec,
        hash: &str,
        bars: &BarTable,
        result: &BacktestResult,
    ) -> anyhow::Result<()> {
        let m = &result.metrics;
        registry
            .upsert_backtest_run(&BacktestRunRecord {
                strategy_name: spec.display_name(),
                symbol: spec.symbol.clone(),
                interval: spec.interval.clone(),
                params_json: serde_json::to_string(&spec.params)?,
                hash_id: hash.to_string(),
                total_return: m.total_return_pct,
                cagr: m.cagr,
                sharpe_ratio: m.sharpe,
                max_drawdown: m.max_drawdown,
                max_drawdown_pct: m.max_drawdown_pct,
                profit_factor: sql_safe(m.profit_factor),
                var_95: m.monte_carlo_var95,
                ending_equity: m.ending_equity,
                win_rate: m.win_rate,
                total_trades: m.total_trades,
                net_profit: m.net_profit,
                data_range_start: bars.first_timestamp().to_string(),
                data_range_end: bars.last_timestamp().to_string(),
                regime: lookup(&spec.archetype).map(|i| i.regime.as_str().to_string()),
                notes: None,
            })
            .await
    }

    fn winner_record(
        &self,
        spec: &StrategySpec,
        hash: &str,
        bars: &BarTable,
        m: &MetricBundle,
        complementarity: f64,
    ) -> WinnerRecord {
        WinnerRecord {
            id: None,
            strategy_name: spec.display_name(),
            archetype: spec.archetype.clone(),
            symbol: spec.symbol.clone(),
            interval: spec.interval.clone(),
            sharpe_ratio: m.sharpe,
            total_return: m.total_return_pct,
            net_profit: m.net_profit,
            max_drawdown: m.max_drawdown,
            max_drawdown_pct: m.max_drawdown_pct,
            win_rate: m.win_rate,
            profit_factor: sql_safe(m.profit_factor),
            total_trades: m.total_trades,
            win_trades: m.win_trades,
            loss_trades: m.loss_trades,
            avg_trade_pnl: m.avg_trade_pnl,
            params_json: serde_json::to_string(&spec.params).unwrap_or_else(|_| "{}".to_string()),
            monte_carlo_var95: m.monte_carlo_var95,
            permutation_pvalue: m.permutation_pvalue,
            deflated_sharpe: m.deflated_sharpe,
            complementarity_score: Some(complementarity),
            data_range_start: bars.first_timestamp().to_string(),
            data_range_end: bars.last_timestamp().to_string(),
            is_active: 1,
            hash_id: hash.to_string(),
        }
    }

    async fn advance(
        &self,
        registry: &Registry,
        spec: &StrategySpec,
        hash: &str,
        stage: &str,
        metrics: &MetricBundle,
    ) -> anyhow::Result<()> {
        registry
            .record_lifecycle_transition(
                hash,
                &spec.display_name(),
                &spec.archetype,
                stage,
                Some(&serde_json::to_string(metrics)?),
                None,
            )
            .await
    }

    async fn reject(
        &self,
        registry: &Registry,
        spec: &StrategySpec,
        hash: &str,
        killed_at_stage: &str,
        reason: String,
        metrics: Option<&MetricBundle>,
    ) -> anyhow::Result<()> {
        tracing::debug!(strategy = %spec.display_name(), stage = killed_at_stage, reason = %reason, "rejected");
        registry
            .record_lifecycle_transition(
                hash,
                &spec.display_name(),
                &spec.archetype,
                "REJECTED",
                None,
                Some(&reason),
            )
            .await?;
        registry
            .insert_graveyard(&GraveyardEntry {
                strategy_hash: hash.to_string(),
                strategy_name: spec.display_name(),
                killed_at_stage: killed_at_stage.to_string(),
                reason,
                best_sharpe: metrics.map(|m| m.sharpe).unwrap_or(0.0),
                total_trades: metrics.map(|m| m.total_trades).unwrap_or(0),
            })
            .await
    }
}

/// Infinity cannot be stored in a REAL column; cap it.
fn sql_safe(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else if value > 0.0 {
        999.0
    } else {
        0.0
    }
}

/// Neighborhood specs: each numeric param shifted by ±delta, one at a time.
pub fn perturbed_specs(spec: &StrategySpec, delta: f64) -> Vec<StrategySpec> {
    let mut variants = Vec::new();
    for (key, value) in &spec.params {
        match value {
            ParamValue::Float(f) => {
                for sign in [-1.0, 1.0] {
                    let mut variant = spec.clone();
                    variant
                        .params
                        .insert(key.clone(), ParamValue::Float(f * (1.0 + sign * delta)));
                    variants.push(variant);
                }
            }
            ParamValue::Int(i) => {
                let shift = ((*i as f64 * delta).round() as i64).max(1);
                for sign in [-1i64, 1] {
                    let shifted = (*i + sign * shift).max(1);
                    if shifted != *i {
                        let mut variant = spec.clone();
                        variant.params.insert(key.clone(), ParamValue::Int(shifted));
                        variants.push(variant);
                    }
                }
            }
            _ => {}
        }
    }
    variants
}
