use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;

use pipeline::IdeaSource;
use strategy_kernels::{lookup, KernelFamily, ParamValue, StrategySpec};

/// LLM-backed idea source speaking the Ollama generate API.
///
/// The model is asked for a JSON array of `{archetype, params}` records.
/// Any transport or parse failure surfaces as an error; the caller degrades
/// to the parametric grid.
pub struct LlmIdeaSource {
    client: reqwest::Client,
    base_url: String,
    model: String,
    symbol: String,
    interval: String,
    batch_size: usize,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct IdeaRecord {
    archetype: String,
    #[serde(default)]
    params: BTreeMap<String, ParamValue>,
}

impl LlmIdeaSource {
    pub fn new(base_url: &str, model: &str, symbol: &str, interval: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            batch_size: 8,
        }
    }

    /// Liveness probe used by preflight; failure is a warning, not fatal.
    pub async fn healthy(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn prompt(&self, directive: Option<&str>, menu: &[&'static str]) -> String {
        let directive = directive.unwrap_or("explore broadly across archetypes");
        format!(
            "You are a quantitative researcher proposing intraday futures strategies \
             for {} on {} bars. Current research directive: {directive}. \
             Propose {} strategy configurations as a JSON array, each an object \
             {{\"archetype\": <one of {menu:?}>, \"params\": {{...}}}}. \
             Respond with the JSON array only.",
            self.symbol, self.interval, self.batch_size
        )
    }
}

#[async_trait]
impl IdeaSource for LlmIdeaSource {
    async fn generate(
        &self,
        directive: Option<&str>,
        menu: &[&'static str],
    ) -> anyhow::Result<Vec<StrategySpec>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": self.prompt(directive, menu),
            "stream": false,
            "format": "json",
        });
        let response: GenerateResponse = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .timeout(std::time::Duration::from_secs(120))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let records: Vec<IdeaRecord> = serde_json::from_str(&response.response)?;
        let specs = records
            .into_iter()
            .map(|r| StrategySpec {
                archetype: r.archetype,
                symbol: self.symbol.clone(),
                interval: self.interval.clone(),
                params: r.params,
            })
            .collect();
        Ok(specs)
    }
}

/// Parametric grid sampler; the always-available fallback idea source.
pub struct GridIdeaSource {
    symbol: String,
    interval: String,
    batch_size: usize,
}

impl GridIdeaSource {
    pub fn new(symbol: &str, interval: &str, batch_size: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            batch_size,
        }
    }

    fn sample(&self, rng: &mut impl Rng, menu: &[&'static str]) -> Option<StrategySpec> {
        let name = *menu.choose(rng)?;
        let info = lookup(name)?;
        let mut spec = StrategySpec::new(name, &self.symbol, &self.interval);

        match info.family {
            KernelFamily::MaCrossover => {
                let short = *[10i64, 20, 50].choose(rng)?;
                let long = *[100i64, 200].choose(rng)?;
                spec = spec
                    .with_param("short_window", ParamValue::Int(short))
                    .with_param("long_window", ParamValue::Int(long));
            }
            KernelFamily::OpeningRange => {
                spec = spec
                    .with_param("ema_filter", ParamValue::Int(*[20i64, 50, 100].choose(rng)?))
                    .with_param("atr_filter", ParamValue::Int(14))
                    .with_param("sl_atr_mult", ParamValue::Float(*[1.5, 2.0, 2.5, 3.0].choose(rng)?))
                    .with_param("tp_atr_mult", ParamValue::Float(*[3.0, 4.0, 5.0, 6.0].choose(rng)?))
                    .with_param("atr_max_mult", ParamValue::Float(*[2.0, 2.5, 3.0].choose(rng)?));
                if rng.gen_bool(0.3) {
                    spec = spec
                        .with_param("use_adx", ParamValue::Bool(true))
                        .with_param("adx_thresh", ParamValue::Float(*[20.0, 25.0].choose(rng)?));
                }
                if rng.gen_bool(0.3) {
                    spec = spec
                        .with_param("use_rvol", ParamValue::Bool(true))
                        .with_param("rvol_thresh", ParamValue::Float(1.5));
                }
                if rng.gen_bool(0.2) {
                    spec = spec
                        .with_param("use_trailing_stop", ParamValue::Bool(true))
                        .with_param("ts_atr_mult", ParamValue::Float(*[2.0, 3.0].choose(rng)?));
                }
            }
            KernelFamily::OvernightFade => {
                spec = spec
                    .with_param("range_minutes", ParamValue::Int(*[30i64, 60, 90].choose(rng)?))
                    .with_param("ema_filter", ParamValue::Int(*[20i64, 50].choose(rng)?))
                    .with_param("atr_filter", ParamValue::Int(14))
                    .with_param("sl_atr_mult", ParamValue::Float(*[1.5, 2.0, 2.5].choose(rng)?))
                    .with_param("tp_atr_mult", ParamValue::Float(*[2.0, 3.0, 4.0].choose(rng)?));
            }
        }
        Some(spec)
    }
}

#[async_trait]
impl IdeaSource for GridIdeaSource {
    async fn generate(
        &self,
        _directive: Option<&str>,
        menu: &[&'static str],
    ) -> anyhow::Result<Vec<StrategySpec>> {
        let mut rng = rand::thread_rng();
        let specs = (0..self.batch_size)
            .filter_map(|_| self.sample(&mut rng, menu))
            .collect();
        Ok(specs)
    }
}

/// Primary LLM source with parametric-grid degradation.
pub struct FallbackIdeaSource {
    pub llm: Option<LlmIdeaSource>,
    pub grid: GridIdeaSource,
}

#[async_trait]
impl IdeaSource for FallbackIdeaSource {
    async fn generate(
        &self,
        directive: Option<&str>,
        menu: &[&'static str],
    ) -> anyhow::Result<Vec<StrategySpec>> {
        if let Some(llm) = &self.llm {
            match llm.generate(directive, menu).await {
                Ok(specs) if !specs.is_empty() => return Ok(specs),
                Ok(_) => tracing::warn!("LLM returned zero ideas, using parametric grid"),
                Err(err) => {
                    tracing::warn!(error = %err, "LLM idea source failed, using parametric grid");
                }
            }
        }
        self.grid.generate(directive, menu).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strategy_kernels::{menu, validate_spec};

    #[tokio::test]
    async fn grid_ideas_are_always_valid_specs() {
        let grid = GridIdeaSource::new("NQ", "5min", 50);
        let specs = grid.generate(None, &menu()).await.unwrap();
        assert_eq!(specs.len(), 50);
        for spec in &specs {
            validate_spec(spec).expect("grid sampler emitted an invalid spec");
            assert_eq!(spec.symbol, "NQ");
            assert_eq!(spec.interval, "5min");
        }
    }

    #[tokio::test]
    async fn fallback_uses_grid_without_llm() {
        let source = FallbackIdeaSource {
            llm: None,
            grid: GridIdeaSource::new("NQ", "5min", 5),
        };
        let specs = source.generate(Some("anything"), &menu()).await.unwrap();
        assert_eq!(specs.len(), 5);
    }

    #[test]
    fn llm_prompt_carries_directive_and_menu() {
        let llm = LlmIdeaSource::new("http://localhost:11434", "llama3", "NQ", "5min");
        let prompt = llm.prompt(Some("hunt lunch-hour fades"), &menu());
        assert!(prompt.contains("hunt lunch-hour fades"));
        assert!(prompt.contains("lunch_range_fade"));
        assert!(prompt.contains("NQ"));
    }
}
