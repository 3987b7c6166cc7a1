/// Daily SMA of intraday closes, shifted one day, reindexed to the bar grid.
///
/// Resamples `close` to one value per calendar day (the day's last close),
/// applies an SMA of `window` days, then maps the value back onto every bar
/// forward-filled. The one-day shift means each bar sees the MA as of
/// *yesterday's* close — a bar never observes a daily aggregate that its own
/// day contributes to.
///
/// `day_ordinal` must be the per-bar calendar ordinal from the bar table.
/// Output is NaN until `window` prior full days exist.
pub fn daily_sma_shifted(close: &[f64], day_ordinal: &[i64], window: usize) -> Vec<f64> {
    let n = close.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n == 0 {
        return out;
    }

    // Last close of each day, in day order.
    let mut daily_closes: Vec<f64> = Vec::new();
    let mut day_index_of_bar: Vec<usize> = Vec::with_capacity(n);
    for i in 0..n {
        if i == 0 || day_ordinal[i] != day_ordinal[i - 1] {
            daily_closes.push(close[i]);
        } else if let Some(last) = daily_closes.last_mut() {
            *last = close[i];
        }
        day_index_of_bar.push(daily_closes.len() - 1);
    }

    // SMA over completed days; the value visible on day d is the SMA ending
    // on day d-1 (the shift).
    let daily_ma = crate::moving::sma(&daily_closes, window);
    for i in 0..n {
        let d = day_index_of_bar[i];
        if d >= 1 {
            out[i] = daily_ma[d - 1];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_sees_yesterdays_ma() {
        // 3 days, 2 bars each; daily last closes are 11, 21, 31.
        let close = vec![10.0, 11.0, 20.0, 21.0, 30.0, 31.0];
        let day = vec![1, 1, 2, 2, 3, 3];
        let out = daily_sma_shifted(&close, &day, 1);
        // Day 1 bars: no prior day.
        assert!(out[0].is_nan() && out[1].is_nan());
        // Day 2 bars see day 1's close.
        assert_eq!(out[2], 11.0);
        assert_eq!(out[3], 11.0);
        // Day 3 bars see day 2's close.
        assert_eq!(out[4], 21.0);
    }

    #[test]
    fn no_lookahead_within_day() {
        // The MA visible during day 3 must not move when day 3's closes change.
        let day = vec![1, 1, 2, 2, 3, 3];
        let a = daily_sma_shifted(&[10.0, 11.0, 20.0, 21.0, 30.0, 31.0], &day, 2);
        let b = daily_sma_shifted(&[10.0, 11.0, 20.0, 21.0, 99.0, 98.0], &day, 2);
        assert_eq!(a[4], b[4]);
        assert_eq!(a[5], b[5]);
        assert!((a[4] - 16.0).abs() < 1e-12); // mean(11, 21)
    }
}
