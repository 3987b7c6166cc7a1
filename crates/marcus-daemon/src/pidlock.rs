use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Single-instance guard: a PID file with a liveness probe.
///
/// A file pointing at a live process blocks startup; a stale file (process
/// gone) is cleaned up and replaced. The lock is released on drop.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).ok();
        }

        if path.exists() {
            let raw = std::fs::read_to_string(&path).unwrap_or_default();
            match raw.trim().parse::<u32>() {
                Ok(old_pid) if pid_alive(old_pid) => {
                    bail!("another daemon instance is running (PID {old_pid})");
                }
                Ok(old_pid) => {
                    tracing::warn!(old_pid, "stale PID file found, cleaning up");
                }
                Err(_) => {
                    tracing::warn!(path = %path.display(), "unparseable PID file, cleaning up");
                }
            }
            std::fs::remove_file(&path).ok();
        }

        let pid = std::process::id();
        std::fs::write(&path, pid.to_string())
            .with_context(|| format!("cannot write PID file {}", path.display()))?;
        tracing::info!(pid, path = %path.display(), "PID lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if std::fs::remove_file(&self.path).is_ok() {
            tracing::info!(path = %self.path.display(), "PID lock released");
        }
    }
}

fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}
