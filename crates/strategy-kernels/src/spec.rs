use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::archetypes;
use crate::error::KernelError;

/// A scalar strategy parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Canonical text form used for hashing. Integral floats collapse to the
    /// integer form so `2` and `2.0` produce the same hash.
    fn canonical(&self) -> String {
        match self {
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => format!("{f}"),
            ParamValue::Text(s) => s.clone(),
        }
    }
}

/// A candidate strategy: archetype + instrument + parameter overrides.
///
/// Identity is the canonical hash over (archetype, symbol, interval, sorted
/// params); the hash is the primary key across the registry, lifecycle table
/// and graveyard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub archetype: String,
    pub symbol: String,
    pub interval: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl StrategySpec {
    pub fn new(archetype: &str, symbol: &str, interval: &str) -> Self {
        Self {
            archetype: archetype.to_string(),
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: ParamValue) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    /// Canonical identity string. BTreeMap iteration already sorts keys.
    pub fn canonical_string(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={}", v.canonical()))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}|{}|{}|{params}",
            self.archetype, self.symbol, self.interval
        )
    }

    /// Stable strategy hash: first 16 hex chars of sha256 over the canonical
    /// string.
    pub fn hash_id(&self) -> String {
        let digest = Sha256::digest(self.canonical_string().as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// Human-readable name used in registry rows and logs.
    pub fn display_name(&self) -> String {
        format!("{}_{}_{}", self.archetype, self.symbol, &self.hash_id()[..6])
    }
}

/// Reject params whose keys the kernel does not recognize.
pub fn validate_keys(
    archetype: &str,
    params: &BTreeMap<String, ParamValue>,
    allowed: &[&str],
) -> Result<(), KernelError> {
    for key in params.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(KernelError::UnknownParam {
                archetype: archetype.to_string(),
                key: key.clone(),
            });
        }
    }
    Ok(())
}

/// Resolve the trading time window (minutes of day) for a spec.
///
/// Params override archetype defaults; several naming conventions are
/// accepted since archetypes name their window fields differently. When only
/// a start is given the window extends two hours, capped at 15:45.
pub fn resolve_time_window(spec: &StrategySpec) -> (u32, u32) {
    let start = ["session_start", "entry_time", "range_start", "orb_start"]
        .iter()
        .find_map(|k| param_time(spec, k));
    let end = ["session_end", "exit_time", "range_end"]
        .iter()
        .find_map(|k| param_time(spec, k));

    if let Some(s) = start {
        let e = end.unwrap_or_else(|| (s + 120).min(15 * 60 + 45));
        return (s, e);
    }
    archetypes::lookup(&spec.archetype)
        .map(|info| info.window)
        .unwrap_or((9 * 60 + 30, 15 * 60 + 45))
}

fn param_time(spec: &StrategySpec, key: &str) -> Option<u32> {
    match spec.params.get(key) {
        Some(ParamValue::Text(s)) => parse_time(s).ok(),
        _ => None,
    }
}

/// Parse "HH:MM" into minute of day.
pub fn parse_time(raw: &str) -> Result<u32, ()> {
    let (h, m) = raw.split_once(':').ok_or(())?;
    let h: u32 = h.trim().parse().map_err(|_| ())?;
    let m: u32 = m.trim().parse().map_err(|_| ())?;
    if h >= 24 || m >= 60 {
        return Err(());
    }
    Ok(h * 60 + m)
}

// --- Typed param access for kernels -----------------------------------------

pub(crate) struct ParamReader<'a> {
    spec: &'a StrategySpec,
}

impl<'a> ParamReader<'a> {
    pub fn new(spec: &'a StrategySpec) -> Self {
        Self { spec }
    }

    fn get(&self, key: &str) -> Option<&ParamValue> {
        self.spec.params.get(key)
    }

    pub fn f64(&self, key: &str, default: f64) -> Result<f64, KernelError> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Float(f)) => Ok(*f),
            Some(ParamValue::Int(i)) => Ok(*i as f64),
            Some(other) => Err(KernelError::ParamType {
                key: key.to_string(),
                expected: "number",
                got: format!("{other:?}"),
            }),
        }
    }

    pub fn usize(&self, key: &str, default: usize) -> Result<usize, KernelError> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Int(i)) if *i >= 0 => Ok(*i as usize),
            Some(ParamValue::Float(f)) if *f >= 0.0 && f.fract() == 0.0 => Ok(*f as usize),
            Some(other) => Err(KernelError::ParamType {
                key: key.to_string(),
                expected: "non-negative integer",
                got: format!("{other:?}"),
            }),
        }
    }

    pub fn bool(&self, key: &str, default: bool) -> Result<bool, KernelError> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Bool(b)) => Ok(*b),
            Some(other) => Err(KernelError::ParamType {
                key: key.to_string(),
                expected: "bool",
                got: format!("{other:?}"),
            }),
        }
    }

    /// Time-of-day param as minute of day.
    pub fn time(&self, key: &str, default: u32) -> Result<u32, KernelError> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Text(s)) => parse_time(s).map_err(|_| KernelError::BadTime {
                key: key.to_string(),
                raw: s.clone(),
            }),
            Some(other) => Err(KernelError::ParamType {
                key: key.to_string(),
                expected: "HH:MM string",
                got: format!("{other:?}"),
            }),
        }
    }
}
