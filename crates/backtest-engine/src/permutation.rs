use rand::seq::SliceRandom;
use rayon::prelude::*;

use market_data::BarTable;

use crate::engine::VectorEngine;
use crate::metrics::annualized_sharpe;
use crate::models::EngineError;

/// Permutation p-value for the null "signals are independent of bar order".
///
/// The signal sequence is shuffled `num_permutations` times; each shuffle is
/// pushed through the same lag/cost arithmetic as the real run and its
/// annualized Sharpe compared against the observed one. The p-value is the
/// fraction of permutations with `Sharpe >= observed`.
pub fn permutation_pvalue(
    engine: &VectorEngine,
    bars: &BarTable,
    signals: &[i8],
    observed_sharpe: f64,
    num_permutations: usize,
) -> Result<Option<f64>, EngineError> {
    if num_permutations == 0 || signals.len() != bars.len() {
        return Ok(None);
    }

    let bars_per_year = engine.config().bars_per_year;
    let hits: usize = (0..num_permutations)
        .into_par_iter()
        .map(|_| {
            let mut shuffled = signals.to_vec();
            shuffled.shuffle(&mut rand::thread_rng());
            match engine.net_returns(bars, &shuffled) {
                Ok((_, net, _)) => {
                    let sharpe = annualized_sharpe(&net, bars_per_year);
                    usize::from(sharpe >= observed_sharpe)
                }
                // A permutation that fails to evaluate counts against the
                // strategy rather than for it.
                Err(_) => 1,
            }
        })
        .sum();

    Ok(Some(hits as f64 / num_permutations as f64))
}
