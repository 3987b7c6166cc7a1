use indicators::{atr, ema};
use market_data::BarTable;

use crate::archetypes::ArchetypeInfo;
use crate::error::KernelError;
use crate::spec::{validate_keys, ParamReader, StrategySpec};
use crate::SignalSeq;

pub const RECOGNIZED_PARAMS: &[&str] = &[
    "session_start",
    "session_end",
    "range_minutes",
    "ema_filter",
    "atr_filter",
    "sl_atr_mult",
    "tp_atr_mult",
];

struct FadeParams {
    start_min: u32,
    end_min: u32,
    range_minutes: u32,
    ema_filter: usize,
    atr_filter: usize,
    sl_atr_mult: f64,
    tp_atr_mult: f64,
}

impl FadeParams {
    fn from_spec(spec: &StrategySpec, info: &ArchetypeInfo) -> Result<Self, KernelError> {
        validate_keys(&spec.archetype, &spec.params, RECOGNIZED_PARAMS)?;
        let r = ParamReader::new(spec);
        let range_minutes = r.usize("range_minutes", 60)? as u32;
        if range_minutes == 0 {
            return Err(KernelError::BadValue {
                key: "range_minutes".to_string(),
                reason: "range window must be positive".to_string(),
            });
        }
        Ok(Self {
            start_min: r.time("session_start", info.window.0)?,
            end_min: r.time("session_end", info.window.1)?,
            range_minutes,
            ema_filter: r.usize("ema_filter", 50)?,
            atr_filter: r.usize("atr_filter", 14)?,
            sl_atr_mult: r.f64("sl_atr_mult", 2.0)?,
            tp_atr_mult: r.f64("tp_atr_mult", 3.0)?,
        })
    }
}

/// Session-range mean-reversion fade.
///
/// A range forms over the first `range_minutes` of the session; afterwards,
/// at most one fade per session: short when price has traded above the range
/// high and closes back below it with `close < ema`, long mirrored. Exits on
/// stop, target, or five minutes before `session_end`, whichever comes first.
///
/// Sessions may span midnight (`session_start > session_end`). A calendar-day
/// change inside the session keeps the session alive; session state only
/// resets when a bar lands back on the evening side of a new session.
pub fn generate(
    spec: &StrategySpec,
    info: &ArchetypeInfo,
    bars: &BarTable,
) -> Result<SignalSeq, KernelError> {
    let p = FadeParams::from_spec(spec, info)?;

    let closes = bars.close();
    let highs = bars.high();
    let lows = bars.low();
    let n = closes.len();

    let ema_line = ema(closes, p.ema_filter);
    let atr_line = atr(highs, lows, closes, p.atr_filter);
    let times = bars.minute_of_day();

    let crosses_midnight = p.start_min > p.end_min;
    let mut range_end_min = p.start_min + p.range_minutes;
    if range_end_min >= 1440 {
        range_end_min -= 1440;
    }
    if !crosses_midnight && range_end_min > p.end_min {
        range_end_min = p.end_min;
    }
    let exit_cutoff = p.end_min.saturating_sub(5);

    let mut signals = vec![0i8; n];

    let mut range_high = f64::NAN;
    let mut range_low = f64::NAN;
    let mut traded_session = false;
    let mut in_session = false;
    let mut range_formed = false;
    let mut broke_high = false;
    let mut broke_low = false;
    let mut in_pos = 0i8;
    let mut sl_price = 0.0;
    let mut tp_price = 0.0;

    for i in 1..n {
        let t = times[i];

        let bar_in_session = if crosses_midnight {
            t >= p.start_min || t < p.end_min
        } else {
            t >= p.start_min && t < p.end_min
        };

        // Evening-side bar with no live session starts a fresh one. Morning
        // bars never start a session; an in-progress session simply carries
        // across the midnight day change.
        let on_evening_side = if crosses_midnight {
            t >= p.start_min
        } else {
            bar_in_session
        };
        if bar_in_session && !in_session && on_evening_side {
            range_high = f64::NAN;
            range_low = f64::NAN;
            traded_session = false;
            range_formed = false;
            broke_high = false;
            broke_low = false;
            in_pos = 0;
            in_session = true;
        }

        if !bar_in_session || !in_session {
            in_pos = 0;
            in_session = false;
            signals[i] = 0;
            continue;
        }

        let in_range_window = if crosses_midnight {
            if range_end_min > p.start_min {
                t >= p.start_min && t < range_end_min
            } else {
                t >= p.start_min || t < range_end_min
            }
        } else {
            t >= p.start_min && t < range_end_min
        };

        if in_range_window && !range_formed {
            if range_high.is_nan() {
                range_high = highs[i];
                range_low = lows[i];
            } else {
                range_high = range_high.max(highs[i]);
                range_low = range_low.min(lows[i]);
            }
            signals[i] = in_pos;
            continue;
        }
        range_formed = true;

        // Hard exit shortly before session end, ahead of RTH-open volatility.
        let near_exit = if crosses_midnight {
            t < p.start_min && t >= exit_cutoff
        } else {
            t >= exit_cutoff
        };
        if near_exit {
            in_pos = 0;
            signals[i] = 0;
            continue;
        }

        if in_pos == 1 {
            if lows[i] <= sl_price {
                in_pos = 0;
            } else if highs[i] >= tp_price {
                in_pos = 0;
            }
        } else if in_pos == -1 {
            if highs[i] >= sl_price {
                in_pos = 0;
            } else if lows[i] <= tp_price {
                in_pos = 0;
            }
        }

        if in_pos == 0 && !traded_session && range_high > range_low {
            let cur_atr = atr_line[i];
            if cur_atr > 0.0 {
                if highs[i] > range_high {
                    broke_high = true;
                }
                if lows[i] < range_low {
                    broke_low = true;
                }

                // Fade the failed breakout back into the range.
                if broke_high && closes[i] < range_high && closes[i] < ema_line[i] {
                    in_pos = -1;
                    sl_price = closes[i] + cur_atr * p.sl_atr_mult;
                    tp_price = closes[i] - cur_atr * p.tp_atr_mult;
                    traded_session = true;
                } else if broke_low && closes[i] > range_low && closes[i] > ema_line[i] {
                    in_pos = 1;
                    sl_price = closes[i] - cur_atr * p.sl_atr_mult;
                    tp_price = closes[i] + cur_atr * p.tp_atr_mult;
                    traded_session = true;
                }
            }
        }

        signals[i] = in_pos;
    }

    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ParamValue;
    use chrono::{Duration, NaiveDate};

    /// Build one overnight session of 5-min bars, 18:00 through 07:55 next
    /// day. `shape(i)` returns (high, low, close) for bar index i.
    fn session_table(shape: impl Fn(usize) -> (f64, f64, f64)) -> BarTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap();
        let n = 168;
        let mut timestamps = Vec::new();
        let mut open = Vec::new();
        let mut high = Vec::new();
        let mut low = Vec::new();
        let mut close = Vec::new();
        for i in 0..n {
            let (h, l, c) = shape(i);
            timestamps.push(start + Duration::minutes(5 * i as i64));
            open.push(c);
            high.push(h);
            low.push(l);
            close.push(c);
        }
        BarTable::new(
            "NQ", "5min", timestamps, open, high, low, close, vec![500.0; n], false,
        )
        .unwrap()
    }

    fn fade_spec() -> StrategySpec {
        StrategySpec::new("overnight", "NQ", "5min")
            .with_param("session_start", ParamValue::Text("18:00".into()))
            .with_param("session_end", ParamValue::Text("08:00".into()))
            .with_param("range_minutes", ParamValue::Int(60))
            .with_param("ema_filter", ParamValue::Int(3))
            .with_param("atr_filter", ParamValue::Int(3))
            .with_param("sl_atr_mult", ParamValue::Float(2.0))
            .with_param("tp_atr_mult", ParamValue::Float(3.0))
    }

    fn info() -> &'static ArchetypeInfo {
        crate::archetypes::lookup("overnight").unwrap()
    }

    /// Quiet wiggle around 100; spike above the range at `spike_idx` closing
    /// back below it; afterwards `after` controls drift per bar.
    fn shape_with_spike(
        spike_idx: usize,
        after: impl Fn(usize) -> f64,
    ) -> impl Fn(usize) -> (f64, f64, f64) {
        move |i| {
            if i < spike_idx {
                let w = if i % 2 == 0 { 0.25 } else { -0.25 };
                (101.0 + w, 99.0 + w, 100.0 + w)
            } else if i == spike_idx {
                // Breaks range high, closes back below it.
                (106.0, 98.5, 99.0)
            } else {
                let c = after(i - spike_idx);
                (c + 1.0, c - 1.0, c)
            }
        }
    }

    #[test]
    fn fades_failed_breakout_short() {
        // Range forms 18:00-19:00 (bars 0..12). Spike at bar 20.
        let t = session_table(shape_with_spike(20, |_| 99.0));
        let signals = generate(&fade_spec(), info(), &t).unwrap();
        assert_eq!(signals[19], 0);
        assert_eq!(signals[20], -1, "failed breakout should be faded short");
    }

    #[test]
    fn target_exit_ends_trade() {
        // Decline 1/bar after entry at ~99: the target a few ATRs below is
        // reached within ~15 bars, then the session stays flat (one trade max).
        let t = session_table(shape_with_spike(20, |k| 99.0 - k as f64));
        let signals = generate(&fade_spec(), info(), &t).unwrap();
        assert_eq!(signals[20], -1);
        let exit = (21..40).find(|&i| signals[i] == 0).expect("target never hit");
        assert!(signals[exit..].iter().all(|s| *s == 0));
    }

    #[test]
    fn holds_across_midnight_and_flattens_before_session_end() {
        // No SL/TP touch after entry: held across midnight, flattened at 07:55.
        let t = session_table(shape_with_spike(20, |_| 99.0));
        let signals = generate(&fade_spec(), info(), &t).unwrap();

        // Bar 72 is the first bar of the next calendar day (00:00).
        assert_eq!(t.minute_of_day()[72], 0);
        assert_ne!(t.day_ordinal()[71], t.day_ordinal()[72]);
        assert_eq!(signals[72], -1, "position must survive the midnight boundary");

        // Last bar is 07:55 — inside the 5-minute pre-close cutoff.
        let last = signals.len() - 1;
        assert_eq!(t.minute_of_day()[last], 7 * 60 + 55);
        assert_eq!(signals[last], 0);

        // Exactly one entry for the whole session.
        let entries = signals
            .windows(2)
            .filter(|w| w[0] == 0 && w[1] != 0)
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn quiet_session_never_trades() {
        let t = session_table(|i| {
            let w = if i % 2 == 0 { 0.25 } else { -0.25 };
            (101.0 + w, 99.0 + w, 100.0 + w)
        });
        let signals = generate(&fade_spec(), info(), &t).unwrap();
        assert!(signals.iter().all(|s| *s == 0));
    }

    #[test]
    fn rejects_unknown_param() {
        let spec = fade_spec().with_param("use_htf", ParamValue::Bool(true));
        let t = session_table(|_| (101.0, 99.0, 100.0));
        let err = generate(&spec, info(), &t).unwrap_err();
        assert!(matches!(err, KernelError::UnknownParam { key, .. } if key == "use_htf"));
    }
}
