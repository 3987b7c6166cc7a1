/// Average Directional Index over `window` bars.
///
/// Wilder's construction: directional movements +DM/-DM and true range are
/// smoothed over `window`, DI lines derived, and DX is smoothed again into
/// ADX. The first valid output lands at index `2 * window - 1`.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < 2 * window {
        return out;
    }

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    let mut tr = vec![0.0; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
        let hl = high[i] - low[i];
        let hc = (high[i] - close[i - 1]).abs();
        let lc = (low[i] - close[i - 1]).abs();
        tr[i] = hl.max(hc).max(lc);
    }

    let w = window as f64;
    // Wilder-smoothed running sums, seeded over bars 1..=window.
    let mut sm_plus: f64 = plus_dm[1..=window].iter().sum();
    let mut sm_minus: f64 = minus_dm[1..=window].iter().sum();
    let mut sm_tr: f64 = tr[1..=window].iter().sum();

    let mut dx = vec![f64::NAN; n];
    dx[window] = dx_value(sm_plus, sm_minus, sm_tr);
    for i in (window + 1)..n {
        sm_plus = sm_plus - sm_plus / w + plus_dm[i];
        sm_minus = sm_minus - sm_minus / w + minus_dm[i];
        sm_tr = sm_tr - sm_tr / w + tr[i];
        dx[i] = dx_value(sm_plus, sm_minus, sm_tr);
    }

    // ADX: Wilder smoothing of DX, seeded with the mean of the first window DX values.
    let seed_end = 2 * window - 1;
    if seed_end >= n {
        return out;
    }
    let mut value: f64 = dx[window..=seed_end].iter().sum::<f64>() / w;
    out[seed_end] = value;
    for i in (seed_end + 1)..n {
        value = (value * (w - 1.0) + dx[i]) / w;
        out[i] = value;
    }
    out
}

fn dx_value(sm_plus: f64, sm_minus: f64, sm_tr: f64) -> f64 {
    if sm_tr <= 0.0 {
        return 0.0;
    }
    let plus_di = 100.0 * sm_plus / sm_tr;
    let minus_di = 100.0 * sm_minus / sm_tr;
    let denom = plus_di + minus_di;
    if denom <= 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_length_is_two_windows() {
        let n = 60;
        let h: Vec<f64> = (0..n).map(|i| 101.0 + i as f64).collect();
        let l: Vec<f64> = (0..n).map(|i| 99.0 + i as f64).collect();
        let c: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let out = adx(&h, &l, &c, 14);
        assert!(out[26].is_nan());
        assert!(!out[27].is_nan());
    }

    #[test]
    fn strong_trend_yields_high_adx() {
        let n = 80;
        let h: Vec<f64> = (0..n).map(|i| 101.0 + i as f64 * 2.0).collect();
        let l: Vec<f64> = (0..n).map(|i| 99.0 + i as f64 * 2.0).collect();
        let c: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 2.0).collect();
        let out = adx(&h, &l, &c, 14);
        let last = out[n - 1];
        assert!(last > 50.0, "one-way trend should push ADX high, got {last}");
    }

    #[test]
    fn output_bounded_0_100() {
        let n = 120;
        let h: Vec<f64> = (0..n).map(|i| 102.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let l: Vec<f64> = (0..n).map(|i| 98.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let c: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        for v in adx(&h, &l, &c, 14).iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(v));
        }
    }
}
