use serde::{Deserialize, Serialize};

/// The closed set of signal-generation algorithms. Every archetype maps to
/// exactly one family; families differ in parameters, not dispatch mechanics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelFamily {
    MaCrossover,
    OpeningRange,
    OvernightFade,
}

/// Market regime an archetype is built to exploit. Used by the
/// complementarity scorer to decide whether a candidate targets a regime the
/// reference portfolio leaves uncovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Breakout,
    Momentum,
    TrendFollowing,
    MeanReversion,
    ChoppyRange,
    Mixed,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Breakout => "breakout",
            Regime::Momentum => "momentum",
            Regime::TrendFollowing => "trend_following",
            Regime::MeanReversion => "mean_reversion",
            Regime::ChoppyRange => "choppy_range",
            Regime::Mixed => "mixed",
        }
    }
}

/// Registry row for one archetype: kernel family, regime tag, and the
/// default active window (minutes of day; start > end means cross-midnight).
#[derive(Debug, Clone, Copy)]
pub struct ArchetypeInfo {
    pub name: &'static str,
    pub family: KernelFamily,
    pub regime: Regime,
    pub window: (u32, u32),
}

const fn min(h: u32, m: u32) -> u32 {
    h * 60 + m
}

/// The archetype menu. Windows and regime tags mirror the deployed
/// portfolio's coverage map; params may override the window per spec.
pub const ARCHETYPES: &[ArchetypeInfo] = &[
    ArchetypeInfo {
        name: "orb_breakout",
        family: KernelFamily::OpeningRange,
        regime: Regime::Breakout,
        window: (min(9, 45), min(15, 45)),
    },
    ArchetypeInfo {
        name: "orb_vwap",
        family: KernelFamily::OpeningRange,
        regime: Regime::Breakout,
        window: (min(9, 45), min(15, 45)),
    },
    ArchetypeInfo {
        name: "orb_momentum",
        family: KernelFamily::OpeningRange,
        regime: Regime::Momentum,
        window: (min(9, 45), min(15, 45)),
    },
    ArchetypeInfo {
        name: "ma_crossover",
        family: KernelFamily::MaCrossover,
        regime: Regime::TrendFollowing,
        window: (min(9, 30), min(15, 45)),
    },
    ArchetypeInfo {
        name: "eod_momentum",
        family: KernelFamily::MaCrossover,
        regime: Regime::Momentum,
        window: (min(13, 30), min(15, 45)),
    },
    ArchetypeInfo {
        name: "lunch_hour_breakout",
        family: KernelFamily::OpeningRange,
        regime: Regime::Breakout,
        window: (min(11, 0), min(13, 30)),
    },
    ArchetypeInfo {
        name: "gap_fill_fade",
        family: KernelFamily::OvernightFade,
        regime: Regime::MeanReversion,
        window: (min(9, 30), min(11, 0)),
    },
    ArchetypeInfo {
        name: "es_gap_combo",
        family: KernelFamily::OpeningRange,
        regime: Regime::Mixed,
        window: (min(9, 30), min(11, 0)),
    },
    ArchetypeInfo {
        name: "power_hour_momentum",
        family: KernelFamily::OpeningRange,
        regime: Regime::Momentum,
        window: (min(14, 0), min(15, 30)),
    },
    ArchetypeInfo {
        name: "first_hour_fade",
        family: KernelFamily::OvernightFade,
        regime: Regime::MeanReversion,
        window: (min(10, 15), min(11, 30)),
    },
    ArchetypeInfo {
        name: "lunch_range_fade",
        family: KernelFamily::OvernightFade,
        regime: Regime::MeanReversion,
        window: (min(11, 30), min(13, 30)),
    },
    ArchetypeInfo {
        name: "overnight",
        family: KernelFamily::OvernightFade,
        regime: Regime::MeanReversion,
        window: (min(18, 0), min(8, 0)),
    },
];

pub fn lookup(name: &str) -> Option<&'static ArchetypeInfo> {
    ARCHETYPES.iter().find(|a| a.name == name)
}

/// Archetype names offered to the idea source.
pub fn menu() -> Vec<&'static str> {
    ARCHETYPES.iter().map(|a| a.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_every_menu_entry() {
        for name in menu() {
            assert!(lookup(name).is_some());
        }
        assert!(lookup("hft_scalper").is_none());
    }

    #[test]
    fn overnight_window_crosses_midnight() {
        let info = lookup("overnight").unwrap();
        assert!(info.window.0 > info.window.1);
    }

    #[test]
    fn mean_reversion_archetypes_exist() {
        let count = ARCHETYPES
            .iter()
            .filter(|a| a.regime == Regime::MeanReversion)
            .count();
        assert!(count >= 3);
    }
}
