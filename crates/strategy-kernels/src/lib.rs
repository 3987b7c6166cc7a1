pub mod archetypes;
pub mod error;
pub mod ma_crossover;
pub mod orb;
pub mod overnight;
pub mod spec;

pub use archetypes::{lookup, menu, ArchetypeInfo, KernelFamily, Regime, ARCHETYPES};
pub use error::KernelError;
pub use spec::{resolve_time_window, ParamValue, StrategySpec};

use market_data::BarTable;

/// Signal values per bar: -1 short, 0 flat, +1 long. The signal emitted on
/// bar `i` is the desired position entering bar `i + 1`; the execution lag is
/// applied by the backtest engine, not here.
pub type SignalSeq = Vec<i8>;

/// Generate the signal sequence for a strategy spec over a bar table.
///
/// Dispatches on the archetype's kernel family. Unknown archetypes and
/// unrecognized params are rejected before any bar is touched.
pub fn generate_signals(spec: &StrategySpec, bars: &BarTable) -> Result<SignalSeq, KernelError> {
    let info = archetypes::lookup(&spec.archetype)
        .ok_or_else(|| KernelError::UnknownArchetype(spec.archetype.clone()))?;
    match info.family {
        KernelFamily::MaCrossover => ma_crossover::generate(spec, bars),
        KernelFamily::OpeningRange => orb::generate(spec, info, bars),
        KernelFamily::OvernightFade => overnight::generate(spec, info, bars),
    }
}

/// Validate a spec without running a kernel: archetype must exist and every
/// param key must be recognized by its kernel family.
pub fn validate_spec(spec: &StrategySpec) -> Result<(), KernelError> {
    let info = archetypes::lookup(&spec.archetype)
        .ok_or_else(|| KernelError::UnknownArchetype(spec.archetype.clone()))?;
    let allowed = match info.family {
        KernelFamily::MaCrossover => ma_crossover::RECOGNIZED_PARAMS,
        KernelFamily::OpeningRange => orb::RECOGNIZED_PARAMS,
        KernelFamily::OvernightFade => overnight::RECOGNIZED_PARAMS,
    };
    spec::validate_keys(&spec.archetype, &spec.params, allowed)
}
