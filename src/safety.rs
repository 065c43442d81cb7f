//! Pre-push safety checks
//!
//! Before the vault copy is written over a local save, the orchestrator asks
//! a [`SafetyOracle`] whether the game is running or the file is held open.
//! The check is advisory: nothing stops the game from starting between the
//! check and the copy.

use crate::error::Result;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use sysinfo::{ProcessRefreshKind, RefreshKind, System};
use tracing::{debug, warn};

/// Reason token when the owning game process is running
pub const REASON_PROCESS_RUNNING: &str = "process_running";
/// Reason token when another process holds the file
pub const REASON_FILE_LOCKED: &str = "file_locked";
/// Reason token when this platform cannot be checked
pub const REASON_UNSUPPORTED: &str = "unsupported_platform";

/// Windows `ERROR_SHARING_VIOLATION`
const SHARING_VIOLATION: i32 = 32;
/// Windows `ERROR_LOCK_VIOLATION`
const LOCK_VIOLATION: i32 = 33;

/// Answer from a [`SafetyOracle`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    /// Machine-readable reason, empty when safe
    pub reason: String,
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        Self {
            safe: true,
            reason: String::new(),
        }
    }

    pub fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: reason.into(),
        }
    }
}

/// Decides whether a local save may be overwritten right now
pub trait SafetyOracle: Send + Sync {
    fn check(&self, path: &Path, title: &str) -> Result<SafetyVerdict>;
}

/// Checks running processes with `sysinfo` and file locks with `fs2`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSafetyOracle;

impl SystemSafetyOracle {
    /// Process names a title's game may run under
    pub fn process_names(title: &str) -> [String; 2] {
        [format!("{}.exe", title), title.to_string()]
    }

    fn running_process(&self, title: &str) -> Option<String> {
        let system = System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::new()),
        );
        let candidates = Self::process_names(title);

        system.processes().values().find_map(|process| {
            candidates
                .iter()
                .find(|candidate| process.name().eq_ignore_ascii_case(candidate.as_str()))
                .cloned()
        })
    }

    fn is_locked(&self, path: &Path) -> Result<bool> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) if e.raw_os_error() == Some(SHARING_VIOLATION) => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                if let Err(e) = file.unlock() {
                    warn!("Failed to release probe lock on {:?}: {}", path, e);
                }
                Ok(false)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(true),
            Err(e) if e.raw_os_error() == Some(LOCK_VIOLATION) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

impl SafetyOracle for SystemSafetyOracle {
    fn check(&self, path: &Path, title: &str) -> Result<SafetyVerdict> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Ok(SafetyVerdict::unsafe_because(REASON_UNSUPPORTED));
        }

        if let Some(name) = self.running_process(title) {
            debug!("{} is running", name);
            return Ok(SafetyVerdict::unsafe_because(format!("{}:{}", REASON_PROCESS_RUNNING, name)));
        }

        if self.is_locked(path)? {
            return Ok(SafetyVerdict::unsafe_because(REASON_FILE_LOCKED));
        }

        Ok(SafetyVerdict::safe())
    }
}

/// Always returns the same verdict
#[derive(Debug, Clone)]
pub struct StaticSafetyOracle {
    verdict: SafetyVerdict,
}

impl StaticSafetyOracle {
    pub fn always_safe() -> Self {
        Self {
            verdict: SafetyVerdict::safe(),
        }
    }

    pub fn always_unsafe(reason: impl Into<String>) -> Self {
        Self {
            verdict: SafetyVerdict::unsafe_because(reason),
        }
    }
}

impl SafetyOracle for StaticSafetyOracle {
    fn check(&self, _path: &Path, _title: &str) -> Result<SafetyVerdict> {
        Ok(self.verdict.clone())
    }
}
