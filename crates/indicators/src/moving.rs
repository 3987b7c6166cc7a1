/// Simple moving average. NaN for the first `window - 1` samples.
pub fn sma(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = sum / window as f64;
    for i in window..n {
        sum += values[i] - values[i - window];
        out[i] = sum / window as f64;
    }
    out
}

/// Rolling sum over `window` samples. NaN for the first `window - 1`.
pub fn rolling_sum(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = sum;
    for i in window..n {
        sum += values[i] - values[i - window];
        out[i] = sum;
    }
    out
}

/// Exponential moving average, seeded with the SMA of the first `window`
/// samples. NaN for the first `window - 1`.
pub fn ema(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    let alpha = 2.0 / (window as f64 + 1.0);
    let mut prev: f64 = values[..window].iter().sum::<f64>() / window as f64;
    out[window - 1] = prev;
    for i in window..n {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_warmup_is_nan() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 2.0).abs() < 1e-12);
        assert!((out[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn sma_shorter_than_window_all_nan() {
        let out = sma(&[1.0, 2.0], 5);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rolling_sum_matches_windows() {
        let out = rolling_sum(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[3.0, 5.0, 7.0]);
    }

    #[test]
    fn ema_converges_toward_constant() {
        let values = vec![10.0; 50];
        let out = ema(&values, 10);
        assert!((out[49] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn ema_is_causal() {
        // Changing a later value must not affect earlier outputs.
        let a = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 2);
        let b = ema(&[1.0, 2.0, 3.0, 4.0, 100.0], 2);
        assert_eq!(a[3], b[3]);
    }
}
