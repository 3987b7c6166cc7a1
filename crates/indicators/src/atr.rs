/// Average True Range over `window` bars, Wilder's smoothing.
///
/// True range for bar `i` is `max(h-l, |h - prev_close|, |l - prev_close|)`
/// (plain `h-l` for the first bar). The seed at index `window - 1` is the SMA
/// of the first `window` true ranges; later values use
/// `atr = (prev * (window - 1) + tr) / window`. NaN warmup prefix.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }

    let mut tr = Vec::with_capacity(n);
    tr.push(high[0] - low[0]);
    for i in 1..n {
        let hl = high[i] - low[i];
        let hc = (high[i] - close[i - 1]).abs();
        let lc = (low[i] - close[i - 1]).abs();
        tr.push(hl.max(hc).max(lc));
    }

    let mut value: f64 = tr[..window].iter().sum::<f64>() / window as f64;
    out[window - 1] = value;
    let w = window as f64;
    for i in window..n {
        value = (value * (w - 1.0) + tr[i]) / w;
        out[i] = value;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_is_nan() {
        let h = vec![101.0; 10];
        let l = vec![99.0; 10];
        let c = vec![100.0; 10];
        let out = atr(&h, &l, &c, 5);
        assert!(out[3].is_nan());
        assert!(!out[4].is_nan());
    }

    #[test]
    fn constant_range_converges_to_range() {
        let n = 50;
        let h: Vec<f64> = (0..n).map(|i| 105.0 + i as f64 * 0.1).collect();
        let l: Vec<f64> = (0..n).map(|i| 95.0 + i as f64 * 0.1).collect();
        let c: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 0.1).collect();
        let out = atr(&h, &l, &c, 14);
        let last = out[n - 1];
        assert!((last - 10.0).abs() < 0.5, "expected ATR near 10, got {last}");
    }

    #[test]
    fn gap_uses_prev_close() {
        // Big overnight gap: |high - prev_close| dominates high - low.
        let h = vec![101.0, 120.0, 121.0, 122.0];
        let l = vec![99.0, 118.0, 119.0, 120.0];
        let c = vec![100.0, 119.0, 120.0, 121.0];
        let out = atr(&h, &l, &c, 2);
        // Seed = mean(tr0, tr1) = mean(2, 20) = 11.
        assert!((out[1] - 11.0).abs() < 1e-12);
    }
}
