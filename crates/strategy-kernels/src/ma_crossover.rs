use indicators::sma;
use market_data::BarTable;

use crate::error::KernelError;
use crate::spec::{validate_keys, ParamReader, StrategySpec};
use crate::SignalSeq;

pub const RECOGNIZED_PARAMS: &[&str] = &["short_window", "long_window"];

/// Moving-average crossover: long while the fast SMA is above the slow SMA,
/// short while below, flat during warmup.
pub fn generate(spec: &StrategySpec, bars: &BarTable) -> Result<SignalSeq, KernelError> {
    validate_keys(&spec.archetype, &spec.params, RECOGNIZED_PARAMS)?;
    let reader = ParamReader::new(spec);
    let short_window = reader.usize("short_window", 50)?;
    let long_window = reader.usize("long_window", 200)?;
    if short_window == 0 || long_window == 0 {
        return Err(KernelError::BadValue {
            key: "short_window".to_string(),
            reason: "windows must be positive".to_string(),
        });
    }
    if short_window >= long_window {
        return Err(KernelError::BadValue {
            key: "long_window".to_string(),
            reason: format!("long_window {long_window} must exceed short_window {short_window}"),
        });
    }

    let close = bars.close();
    let fast = sma(close, short_window);
    let slow = sma(close, long_window);

    let mut signals = vec![0i8; close.len()];
    for i in 0..close.len() {
        if slow[i].is_nan() || fast[i].is_nan() {
            continue;
        }
        if fast[i] > slow[i] {
            signals[i] = 1;
        } else if fast[i] < slow[i] {
            signals[i] = -1;
        }
    }
    Ok(signals)
}
