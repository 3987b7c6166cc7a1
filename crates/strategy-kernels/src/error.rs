use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("unknown archetype '{0}'")]
    UnknownArchetype(String),

    #[error("archetype '{archetype}' does not recognize param '{key}'")]
    UnknownParam { archetype: String, key: String },

    #[error("param '{key}': expected {expected}, got '{got}'")]
    ParamType {
        key: String,
        expected: &'static str,
        got: String,
    },

    #[error("param '{key}': invalid time-of-day '{raw}' (expected HH:MM)")]
    BadTime { key: String, raw: String },

    #[error("param '{key}': {reason}")]
    BadValue { key: String, reason: String },
}
