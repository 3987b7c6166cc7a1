use indicators::{adx, atr, daily_sma_shifted, efficiency_ratio, ema, sma};
use market_data::BarTable;

use crate::archetypes::ArchetypeInfo;
use crate::error::KernelError;
use crate::spec::{validate_keys, ParamReader, StrategySpec};
use crate::SignalSeq;

pub const RECOGNIZED_PARAMS: &[&str] = &[
    "orb_start",
    "orb_end",
    "ema_filter",
    "atr_filter",
    "sl_atr_mult",
    "tp_atr_mult",
    "atr_max_mult",
    "use_htf",
    "htf_ma",
    "use_rvol",
    "rvol_thresh",
    "use_hurst",
    "hurst_thresh",
    "use_adx",
    "adx_thresh",
    "use_trailing_stop",
    "ts_atr_mult",
];

struct OrbParams {
    orb_start: u32,
    orb_end: u32,
    session_close: u32,
    ema_filter: usize,
    atr_filter: usize,
    sl_atr_mult: f64,
    tp_atr_mult: f64,
    atr_max_mult: f64,
    use_htf: bool,
    htf_ma: usize,
    use_rvol: bool,
    rvol_thresh: f64,
    use_hurst: bool,
    hurst_thresh: f64,
    use_adx: bool,
    adx_thresh: f64,
    use_trailing_stop: bool,
    ts_atr_mult: f64,
}

impl OrbParams {
    fn from_spec(spec: &StrategySpec, info: &ArchetypeInfo) -> Result<Self, KernelError> {
        validate_keys(&spec.archetype, &spec.params, RECOGNIZED_PARAMS)?;
        let r = ParamReader::new(spec);
        let orb_start = r.time("orb_start", 9 * 60 + 30)?;
        let orb_end = r.time("orb_end", 9 * 60 + 45)?;
        if orb_end <= orb_start {
            return Err(KernelError::BadValue {
                key: "orb_end".to_string(),
                reason: "range window must end after it starts".to_string(),
            });
        }
        Ok(Self {
            orb_start,
            orb_end,
            session_close: info.window.1,
            ema_filter: r.usize("ema_filter", 50)?,
            atr_filter: r.usize("atr_filter", 14)?,
            sl_atr_mult: r.f64("sl_atr_mult", 2.0)?,
            tp_atr_mult: r.f64("tp_atr_mult", 4.0)?,
            atr_max_mult: r.f64("atr_max_mult", 2.5)?,
            use_htf: r.bool("use_htf", false)?,
            htf_ma: r.usize("htf_ma", 200)?,
            use_rvol: r.bool("use_rvol", false)?,
            rvol_thresh: r.f64("rvol_thresh", 1.5)?,
            use_hurst: r.bool("use_hurst", false)?,
            hurst_thresh: r.f64("hurst_thresh", 0.5)?,
            use_adx: r.bool("use_adx", false)?,
            adx_thresh: r.f64("adx_thresh", 20.0)?,
            use_trailing_stop: r.bool("use_trailing_stop", false)?,
            ts_atr_mult: r.f64("ts_atr_mult", 3.0)?,
        })
    }
}

/// Opening-range breakout.
///
/// Per session (detected by calendar-ordinal change, not wall-clock
/// wraparound): track the high/low of bars inside `[orb_start, orb_end)`,
/// then allow at most one entry in `[orb_end, session_close)` when the close
/// breaks the range in the direction of the EMA and every enabled filter
/// passes. Stops and targets are ATR multiples of the entry close. Intra-bar
/// exits are pessimistic: the stop is checked before the target. With the
/// trailing stop enabled the fixed target is disabled and the stop ratchets
/// from the *previous* bar's extreme, so the level tested against a bar was
/// fixed before that bar printed.
pub fn generate(
    spec: &StrategySpec,
    info: &ArchetypeInfo,
    bars: &BarTable,
) -> Result<SignalSeq, KernelError> {
    let p = OrbParams::from_spec(spec, info)?;

    let closes = bars.close();
    let highs = bars.high();
    let lows = bars.low();
    let n = closes.len();

    let ema_line = ema(closes, p.ema_filter);
    let atr_line = atr(highs, lows, closes, p.atr_filter);
    let htf_line = if p.use_htf {
        daily_sma_shifted(closes, bars.day_ordinal(), p.htf_ma)
    } else {
        Vec::new()
    };
    let rvol_line = if p.use_rvol {
        let avg = sma(bars.volume(), 20);
        bars.volume()
            .iter()
            .zip(avg.iter())
            .map(|(v, a)| v / a)
            .collect()
    } else {
        Vec::new()
    };
    let er_line = if p.use_hurst {
        efficiency_ratio(closes, 10)
    } else {
        Vec::new()
    };
    let adx_line = if p.use_adx {
        adx(highs, lows, closes, 14)
    } else {
        Vec::new()
    };

    let times = bars.minute_of_day();
    let days = bars.day_ordinal();

    let mut signals = vec![0i8; n];

    let mut orb_high = f64::NAN;
    let mut orb_low = f64::NAN;
    let mut traded_today = false;
    let mut in_pos = 0i8;
    let mut sl_price = 0.0;
    let mut tp_price = 0.0;

    // NaN-tolerant filter pass: an enabled filter with a warmup-NaN input
    // produces no signal, which blocks entry.
    let filters_pass = |i: usize, long: bool| -> bool {
        if p.use_htf {
            let ma = htf_line[i];
            if !(if long { closes[i] > ma } else { closes[i] < ma }) {
                return false;
            }
        }
        if p.use_rvol && !(rvol_line[i] > p.rvol_thresh) {
            return false;
        }
        if p.use_hurst && !(er_line[i] > p.hurst_thresh) {
            return false;
        }
        if p.use_adx && !(adx_line[i] > p.adx_thresh) {
            return false;
        }
        true
    };

    for i in 1..n {
        let t = times[i];

        // New trading session.
        if days[i] != days[i - 1] {
            orb_high = f64::NAN;
            orb_low = f64::NAN;
            traded_today = false;
            in_pos = 0;
        }

        if t >= p.orb_start && t < p.orb_end {
            // Range formation.
            if orb_high.is_nan() {
                orb_high = highs[i];
                orb_low = lows[i];
            } else {
                orb_high = orb_high.max(highs[i]);
                orb_low = orb_low.min(lows[i]);
            }
        } else if t >= p.orb_end && t < p.session_close {
            // Exits first.
            if in_pos == 1 {
                if p.use_trailing_stop {
                    let new_sl = highs[i - 1] - atr_line[i - 1] * p.ts_atr_mult;
                    if new_sl > sl_price {
                        sl_price = new_sl;
                    }
                }
                if lows[i] <= sl_price {
                    in_pos = 0;
                } else if !p.use_trailing_stop && highs[i] >= tp_price {
                    in_pos = 0;
                }
            } else if in_pos == -1 {
                if p.use_trailing_stop {
                    let new_sl = lows[i - 1] + atr_line[i - 1] * p.ts_atr_mult;
                    if new_sl < sl_price {
                        sl_price = new_sl;
                    }
                }
                if highs[i] >= sl_price {
                    in_pos = 0;
                } else if !p.use_trailing_stop && lows[i] <= tp_price {
                    in_pos = 0;
                }
            }

            // Entries: one per session, formed range, range size bounded by ATR.
            if in_pos == 0 && !traded_today && !orb_high.is_nan() {
                let range_size = orb_high - orb_low;
                let cur_atr = atr_line[i];
                if range_size > 0.0 && cur_atr > 0.0 && range_size <= cur_atr * p.atr_max_mult {
                    if closes[i] > orb_high && closes[i] > ema_line[i] && filters_pass(i, true) {
                        in_pos = 1;
                        sl_price = closes[i] - cur_atr * p.sl_atr_mult;
                        tp_price = closes[i] + cur_atr * p.tp_atr_mult;
                        traded_today = true;
                    } else if closes[i] < orb_low
                        && closes[i] < ema_line[i]
                        && filters_pass(i, false)
                    {
                        in_pos = -1;
                        sl_price = closes[i] + cur_atr * p.sl_atr_mult;
                        tp_price = closes[i] - cur_atr * p.tp_atr_mult;
                        traded_today = true;
                    }
                }
            }
        } else if t >= p.session_close {
            in_pos = 0;
        }

        signals[i] = in_pos;
    }

    Ok(signals)
}
