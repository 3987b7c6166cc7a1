use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Daemon state persisted across restarts.
///
/// The file is shared with the dashboard, which owns `paused`, `stopped` and
/// the guidance fields. The daemon writes only its own metrics back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonState {
    pub last_cycle_at: Option<String>,
    pub last_dashboard_at: Option<String>,
    pub last_heartbeat_at: Option<String>,
    pub total_cycles: u64,
    pub total_errors: u64,
    pub started_at: Option<String>,
    pub paused: bool,
    pub stopped: bool,
    pub guide_text: Option<String>,
    pub directive: Option<String>,
    pub exploration_mode: Option<String>,
    pub active_objective: Option<String>,
    pub active_preset_id: Option<String>,
}

/// Fields the daemon owns; everything else in the file belongs to the
/// dashboard and must survive our writes untouched.
const DAEMON_FIELDS: &[&str] = &[
    "last_cycle_at",
    "last_dashboard_at",
    "last_heartbeat_at",
    "total_cycles",
    "total_errors",
    "started_at",
];

pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current state. An unreadable or corrupt file is a cold
    /// start, not an error.
    pub fn load(&self) -> DaemonState {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(state) => state,
                Err(err) => {
                    tracing::warn!(error = %err, "state file corrupt, starting cold");
                    DaemonState::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => DaemonState::default(),
            Err(err) => {
                tracing::warn!(error = %err, "state file unreadable, starting cold");
                DaemonState::default()
            }
        }
    }

    /// Read-modify-merge-write: overlay only daemon-owned fields onto the
    /// on-disk document, then replace the file atomically. Control flags and
    /// any dashboard-written keys survive. `force_flags` (paused, stopped)
    /// overrides both — used by explicit start/stop.
    pub fn save(&self, state: &DaemonState, force_flags: Option<(bool, bool)>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).ok();
        }

        let mut doc: Map<String, Value> = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();

        let ours = serde_json::to_value(state)?;
        if let Value::Object(fields) = ours {
            for (key, value) in fields {
                if DAEMON_FIELDS.contains(&key.as_str()) {
                    doc.insert(key, value);
                }
            }
        }
        if let Some((paused, stopped)) = force_flags {
            doc.insert("paused".to_string(), Value::Bool(paused));
            doc.insert("stopped".to_string(), Value::Bool(stopped));
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&Value::Object(doc))?)
            .with_context(|| format!("cannot write state temp file {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("cannot replace state file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_file(dir: &tempfile::TempDir) -> StateFile {
        StateFile::new(dir.path().join("marcus_state.json"))
    }

    #[test]
    fn missing_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let sf = state_file(&dir);
        let state = sf.load();
        assert_eq!(state.total_cycles, 0);
        assert!(!state.paused);
    }

    #[test]
    fn corrupt_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let sf = state_file(&dir);
        std::fs::write(sf.path(), "{broken").unwrap();
        assert_eq!(sf.load().total_cycles, 0);
    }

    #[test]
    fn save_preserves_dashboard_owned_fields() {
        let dir = tempfile::tempdir().unwrap();
        let sf = state_file(&dir);
        // Dashboard wrote control flags and a directive.
        std::fs::write(
            sf.path(),
            r#"{"paused": true, "stopped": false, "directive": "focus on lunch fades",
                "custom_dashboard_key": 42, "total_cycles": 7}"#,
        )
        .unwrap();

        let mut state = sf.load();
        assert!(state.paused);
        assert_eq!(state.directive.as_deref(), Some("focus on lunch fades"));

        // Daemon updates its own metrics and saves.
        state.total_cycles = 8;
        state.last_cycle_at = Some("2026-01-01T00:00:00".to_string());
        sf.save(&state, None).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sf.path()).unwrap()).unwrap();
        assert_eq!(doc["paused"], true, "control flag clobbered");
        assert_eq!(doc["directive"], "focus on lunch fades");
        assert_eq!(doc["custom_dashboard_key"], 42, "unknown dashboard key lost");
        assert_eq!(doc["total_cycles"], 8);
    }

    #[test]
    fn noop_round_trip_changes_only_daemon_fields() {
        let dir = tempfile::tempdir().unwrap();
        let sf = state_file(&dir);
        std::fs::write(
            sf.path(),
            r#"{"paused": false, "stopped": false, "guide_text": "g", "total_cycles": 3,
                "total_errors": 1, "started_at": "2026-01-01T00:00:00"}"#,
        )
        .unwrap();

        let state = sf.load();
        sf.save(&state, None).unwrap();
        let reread = sf.load();

        assert_eq!(reread.total_cycles, 3);
        assert_eq!(reread.total_errors, 1);
        assert_eq!(reread.guide_text.as_deref(), Some("g"));
        assert!(!reread.paused);
    }

    #[test]
    fn force_flags_override_control_fields() {
        let dir = tempfile::tempdir().unwrap();
        let sf = state_file(&dir);
        std::fs::write(sf.path(), r#"{"paused": true, "stopped": true}"#).unwrap();

        sf.save(&DaemonState::default(), Some((false, false))).unwrap();
        let state = sf.load();
        assert!(!state.paused);
        assert!(!state.stopped);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let sf = state_file(&dir);
        sf.save(&DaemonState::default(), None).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}
