use serde::{Deserialize, Serialize};
use strategy_kernels::Regime;

const MINUTES_PER_DAY: usize = 1440;

/// Fixed descriptor of the already-deployed portfolio: its active time
/// windows and known gap windows, in minutes of day. A window whose start
/// exceeds its end wraps past midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePortfolio {
    pub windows: Vec<(u32, u32)>,
    pub gap_windows: Vec<(u32, u32)>,
}

impl Default for ReferencePortfolio {
    /// The deployed NQ portfolio: five RTH sub-strategies (09:30-15:45) plus
    /// an overnight drift leg (18:05-09:25). Remaining weaknesses: the
    /// post-close dead zone, the lunch lull, and the 5-minute morning
    /// handover.
    fn default() -> Self {
        Self {
            windows: vec![(9 * 60 + 30, 15 * 60 + 45), (18 * 60 + 5, 9 * 60 + 25)],
            gap_windows: vec![
                (15 * 60 + 45, 18 * 60 + 5),
                (11 * 60 + 30, 13 * 60 + 30),
                (9 * 60 + 25, 9 * 60 + 30),
            ],
        }
    }
}

/// Scorer output: the number in [0, 100] plus its components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplementBreakdown {
    pub score: f64,
    pub time_overlap: f64,
    pub regime_complement: bool,
    pub gap_coverage: bool,
    pub covers_lunch: bool,
    pub covers_post_close: bool,
}

fn mark_window(set: &mut [bool; MINUTES_PER_DAY], start: u32, end: u32) {
    if start > end {
        for m in start as usize..MINUTES_PER_DAY {
            set[m] = true;
        }
        for m in 0..end as usize {
            set[m] = true;
        }
    } else {
        for m in start as usize..end as usize {
            set[m] = true;
        }
    }
}

/// Score how complementary a candidate is to the reference portfolio.
///
/// `25·(1−overlap) + 35·regime + 20·gap + 10·(overlap<0.5) + 5·lunch +
/// 5·post_close`, clamped to [0, 100]. Overlap is computed on minute-of-day
/// sets, so cross-midnight windows on either side are exact.
pub fn complementarity_score(
    regime: Regime,
    window: (u32, u32),
    reference: &ReferencePortfolio,
) -> ComplementBreakdown {
    let (start, end) = window;

    let mut strat = [false; MINUTES_PER_DAY];
    mark_window(&mut strat, start, end);
    let strat_minutes = strat.iter().filter(|m| **m).count();

    let mut reference_minutes = [false; MINUTES_PER_DAY];
    for &(s, e) in &reference.windows {
        mark_window(&mut reference_minutes, s, e);
    }
    let mut gap_minutes = [false; MINUTES_PER_DAY];
    for &(s, e) in &reference.gap_windows {
        mark_window(&mut gap_minutes, s, e);
    }

    let overlap_count = (0..MINUTES_PER_DAY)
        .filter(|&m| strat[m] && reference_minutes[m])
        .count();
    let time_overlap = if strat_minutes > 0 {
        overlap_count as f64 / strat_minutes as f64
    } else {
        0.0
    };

    let regime_complement = matches!(regime, Regime::MeanReversion | Regime::ChoppyRange);
    let gap_coverage = (0..MINUTES_PER_DAY).any(|m| strat[m] && gap_minutes[m]);

    let covers_lunch = start <= 11 * 60 + 30 && end >= 13 * 60 + 30;
    let covers_post_close = start >= 15 * 60 + 45 && end <= 18 * 60 + 5 && start < end;

    let mut score = (1.0 - time_overlap) * 25.0;
    if regime_complement {
        score += 35.0;
    }
    if gap_coverage {
        score += 20.0;
    }
    if time_overlap < 0.5 {
        score += 10.0;
    }
    if covers_lunch {
        score += 5.0;
    }
    if covers_post_close {
        score += 5.0;
    }

    ComplementBreakdown {
        score: score.clamp(0.0, 100.0),
        time_overlap,
        regime_complement,
        gap_coverage,
        covers_lunch,
        covers_post_close,
    }
}
