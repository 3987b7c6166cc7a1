/// Kaufman efficiency ratio over `window` bars.
///
/// `|close[i] - close[i-window]|` divided by the sum of absolute bar-to-bar
/// moves across the same span. Ranges 0..1; values above 0.5 indicate trend
/// persistence. NaN for the first `window` samples and wherever the
/// volatility sum is zero.
pub fn efficiency_ratio(close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n <= window {
        return out;
    }

    let mut vol_sum = 0.0;
    for i in 1..=window {
        vol_sum += (close[i] - close[i - 1]).abs();
    }
    for i in window..n {
        if i > window {
            vol_sum += (close[i] - close[i - 1]).abs();
            vol_sum -= (close[i - window] - close[i - window - 1]).abs();
        }
        if vol_sum > 0.0 {
            out[i] = (close[i] - close[i - window]).abs() / vol_sum;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_series_has_unit_efficiency() {
        let close: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let out = efficiency_ratio(&close, 10);
        assert!((out[29] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn oscillating_series_has_low_efficiency() {
        let close: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let out = efficiency_ratio(&close, 10);
        assert!(out[29] < 0.2);
    }

    #[test]
    fn flat_series_is_nan() {
        let close = vec![100.0; 30];
        let out = efficiency_ratio(&close, 10);
        assert!(out[29].is_nan());
    }
}
