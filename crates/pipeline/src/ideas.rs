use async_trait::async_trait;
use strategy_kernels::StrategySpec;

/// Source of candidate strategy specs for a research cycle.
///
/// Implementations may call an LLM, sample a parameter grid, or replay a
/// fixed batch (tests). A failing source degrades the cycle to zero ideas —
/// it never aborts it.
#[async_trait]
pub trait IdeaSource: Send + Sync {
    async fn generate(
        &self,
        directive: Option<&str>,
        archetype_menu: &[&'static str],
    ) -> anyhow::Result<Vec<StrategySpec>>;
}

/// Fixed batch of specs; handy for tests and replays.
pub struct StaticIdeas(pub Vec<StrategySpec>);

#[async_trait]
impl IdeaSource for StaticIdeas {
    async fn generate(
        &self,
        _directive: Option<&str>,
        _archetype_menu: &[&'static str],
    ) -> anyhow::Result<Vec<StrategySpec>> {
        Ok(self.0.clone())
    }
}
