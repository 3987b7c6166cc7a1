use statrs::distribution::{ContinuousCDF, Normal};

/// Deflated Sharpe Ratio, Bailey & López de Prado (2014).
///
/// Corrects the observed Sharpe for non-normal returns and for the number of
/// candidates tried before this one was selected. The result is a
/// probability in [0, 1]: the confidence that the true Sharpe exceeds the
/// expected maximum Sharpe of `num_trials` skill-less strategies.
#[derive(Debug, Clone)]
pub struct DeflatedSharpe {
    /// P(SR > max-null SR); compare against the configured floor.
    pub probability: f64,
    /// Per-bar (non-annualized) observed Sharpe.
    pub observed_sr: f64,
    /// Expected maximum per-bar Sharpe under the null, given the trial count.
    pub expected_max_sr: f64,
    pub num_trials: usize,
    pub num_observations: usize,
    pub skewness: f64,
    pub kurtosis: f64,
}

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

/// Compute the DSR from per-bar net returns.
///
/// `num_trials` is the number of candidate strategies evaluated in the
/// selection pool (the current cycle). Degenerate inputs (too few returns,
/// zero variance) yield probability 0 — never a free pass.
pub fn deflated_sharpe_ratio(returns: &[f64], num_trials: usize) -> DeflatedSharpe {
    let t = returns.len();
    let trials = num_trials.max(1);

    let degenerate = |sr: f64, skew: f64, kurt: f64| DeflatedSharpe {
        probability: 0.0,
        observed_sr: sr,
        expected_max_sr: 0.0,
        num_trials: trials,
        num_observations: t,
        skewness: skew,
        kurtosis: kurt,
    };

    if t < 4 {
        return degenerate(0.0, 0.0, 3.0);
    }

    let n = t as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let m2 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = m2.sqrt();
    if std <= 0.0 {
        return degenerate(0.0, 0.0, 3.0);
    }
    let m3 = returns.iter().map(|r| (r - mean).powi(3)).sum::<f64>() / n;
    let m4 = returns.iter().map(|r| (r - mean).powi(4)).sum::<f64>() / n;
    let skew = m3 / std.powi(3);
    let kurt = m4 / m2.powi(2);

    let sr = mean / std;

    // Expected maximum Sharpe of `trials` null strategies over n observations
    // (extreme-value approximation).
    let normal = Normal::new(0.0, 1.0).expect("unit normal");
    let sr_std_null = (1.0 / n).sqrt();
    let expected_max_sr = if trials > 1 {
        let q1 = normal.inverse_cdf(1.0 - 1.0 / trials as f64);
        let q2 = normal.inverse_cdf(1.0 - 1.0 / (trials as f64 * std::f64::consts::E));
        sr_std_null * ((1.0 - EULER_MASCHERONI) * q1 + EULER_MASCHERONI * q2)
    } else {
        0.0
    };

    // Variance adjustment for skew/kurtosis of the return distribution.
    let denom = 1.0 - skew * sr + (kurt - 1.0) / 4.0 * sr * sr;
    if denom <= 0.0 {
        return degenerate(sr, skew, kurt);
    }

    let z = (sr - expected_max_sr) * (n - 1.0).sqrt() / denom.sqrt();
    let probability = normal.cdf(z);

    DeflatedSharpe {
        probability,
        observed_sr: sr,
        expected_max_sr,
        num_trials: trials,
        num_observations: t,
        skewness: skew,
        kurtosis: kurt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drifting_returns(n: usize, drift: f64) -> Vec<f64> {
        (0..n)
            .map(|i| drift + if i % 2 == 0 { 0.004 } else { -0.004 })
            .collect()
    }

    #[test]
    fn strong_edge_single_trial_is_confident() {
        let dsr = deflated_sharpe_ratio(&drifting_returns(500, 0.002), 1);
        assert!(dsr.probability > 0.95, "got {}", dsr.probability);
    }

    #[test]
    fn more_trials_deflate_confidence() {
        let returns = drifting_returns(500, 0.0005);
        let few = deflated_sharpe_ratio(&returns, 1);
        let many = deflated_sharpe_ratio(&returns, 10_000);
        assert!(many.probability < few.probability);
        assert!(many.expected_max_sr > few.expected_max_sr);
    }

    #[test]
    fn zero_variance_is_not_a_free_pass() {
        let dsr = deflated_sharpe_ratio(&[0.001; 100], 10);
        assert_eq!(dsr.probability, 0.0);
    }

    #[test]
    fn negative_edge_has_low_probability() {
        let dsr = deflated_sharpe_ratio(&drifting_returns(500, -0.002), 5);
        assert!(dsr.probability < 0.05, "got {}", dsr.probability);
    }
}
