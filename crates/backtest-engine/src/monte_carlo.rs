use rand::Rng;
use rayon::prelude::*;

use crate::models::Trade;

/// Monte-Carlo VaR95 by bootstrap-resampling the trade PnL series.
///
/// Each simulation draws `trades.len()` PnLs with replacement, replays them
/// additively from `initial_capital`, and records the normalized outcome
/// `(final - initial) / initial`. VaR95 is the 5th percentile of that
/// distribution (typically negative).
///
/// Returns `None` when there are no trades or no simulations to run.
pub fn monte_carlo_var95(
    trades: &[Trade],
    initial_capital: f64,
    num_simulations: usize,
) -> Option<f64> {
    if trades.is_empty() || num_simulations == 0 || initial_capital <= 0.0 {
        return None;
    }

    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let n = pnls.len();

    let mut outcomes: Vec<f64> = (0..num_simulations)
        .into_par_iter()
        .map(|_| {
            let mut rng = rand::thread_rng();
            let total: f64 = (0..n).map(|_| pnls[rng.gen_range(0..n)]).sum();
            total / initial_capital
        })
        .collect();

    outcomes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(percentile_sorted(&outcomes, 5.0))
}

pub(crate) fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn trade(pnl: f64) -> Trade {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Trade {
            direction: 1,
            entry_index: 1,
            exit_index: 2,
            entry_time: ts,
            exit_time: ts,
            entry_price: 100.0,
            exit_price: 101.0,
            bars_held: 1,
            pnl,
            return_pct: pnl / 1000.0,
        }
    }

    #[test]
    fn empty_trades_give_none() {
        assert!(monte_carlo_var95(&[], 100_000.0, 100).is_none());
    }

    #[test]
    fn all_losses_give_negative_var() {
        let trades: Vec<Trade> = (0..20).map(|_| trade(-500.0)).collect();
        let var = monte_carlo_var95(&trades, 100_000.0, 200).unwrap();
        // Every resample sums to -10_000 exactly.
        assert!((var - (-0.1)).abs() < 1e-12);
    }

    #[test]
    fn all_wins_give_positive_var() {
        let trades: Vec<Trade> = (0..20).map(|_| trade(250.0)).collect();
        let var = monte_carlo_var95(&trades, 100_000.0, 200).unwrap();
        assert!(var > 0.0);
    }

    #[test]
    fn var95_is_lower_tail() {
        let mut trades: Vec<Trade> = (0..30).map(|_| trade(100.0)).collect();
        trades.extend((0..10).map(|_| trade(-2_000.0)));
        let var = monte_carlo_var95(&trades, 100_000.0, 500).unwrap();
        let mean_outcome = (30.0 * 100.0 - 10.0 * 2000.0) / 100_000.0;
        assert!(var < mean_outcome, "VaR95 {var} should sit below the mean outcome");
    }
}
