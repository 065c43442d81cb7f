//! Configuration
//!
//! Two layers:
//!
//! - [`SyncConfig`]: where the vault, logs and configuration documents
//!   live, and how much history to keep. Built with [`SyncConfigBuilder`]
//!   and passed into every component explicitly.
//! - [`ConfigStore`]: the JSON documents in the configuration directory.
//!
//! | file           | type              | contents                                   |
//! |----------------|-------------------|--------------------------------------------|
//! | `devices.json` | [`DeviceRegistry`]| known machines and when they were last seen|
//! | `paths.json`   | [`PathRegistry`]  | title → device → candidate save paths      |
//! | `rules.json`   | [`Rules`]         | include/exclude globs and history limit    |
//!
//! A missing document loads as its default. A document that fails to parse
//! is copied aside to `<file>.backup-<YYYYMMDD-HHMMSS>` before
//! [`SyncError::ConfigCorrupt`] is returned, so a hand-edited file is never
//! lost.
//!
//! ## Example
//!
//! ```rust,no_run
//! use savesync::config::SyncConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::builder()
//!     .vault_root("/mnt/usb/savesync/vault")
//!     .log_root("/mnt/usb/savesync/logs")
//!     .config_dir("/mnt/usb/savesync/data")
//!     .history_limit(10)
//!     .build()?;
//! assert_eq!(config.history_limit, 10);
//! # Ok(())
//! # }
//! ```

use crate::clock::Clock;
use crate::error::{Result, SyncError};
use crate::utils::{atomic_copy, atomic_write, ensure_dir, expand_env_path};
use crate::vault::VaultLayout;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of backups kept per title
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

pub const DEVICES_FILE: &str = "devices.json";
pub const PATHS_FILE: &str = "paths.json";
pub const RULES_FILE: &str = "rules.json";

/// Locations and limits for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root of the vault
    pub vault_root: PathBuf,
    /// Directory receiving daily JSON-lines logs
    pub log_root: PathBuf,
    /// Directory holding `devices.json`, `paths.json` and `rules.json`
    pub config_dir: PathBuf,
    /// Backups kept per title after a mutating operation
    pub history_limit: usize,
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// Layout rooted under `base`: `vault/`, `logs/` and `data/`
    pub fn under(base: &Path) -> Self {
        Self {
            vault_root: base.join("vault"),
            log_root: base.join("logs"),
            config_dir: base.join("data"),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn layout(&self) -> VaultLayout {
        VaultLayout::new(&self.vault_root)
    }
}

/// Builder for [`SyncConfig`]
///
/// The vault root is required. Log and configuration directories default to
/// `logs/` and `data/` beside the vault root.
#[derive(Debug, Default, Clone)]
pub struct SyncConfigBuilder {
    vault_root: Option<PathBuf>,
    log_root: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    history_limit: Option<usize>,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vault_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.vault_root = Some(path.into());
        self
    }

    pub fn log_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_root = Some(path.into());
        self
    }

    pub fn config_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(path.into());
        self
    }

    /// Backups kept per title; zero is raised to one
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit.max(1));
        self
    }

    pub fn build(self) -> Result<SyncConfig> {
        let vault_root = self
            .vault_root
            .ok_or_else(|| SyncError::custom("vault root is required"))?;
        let base = vault_root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(SyncConfig {
            log_root: self.log_root.unwrap_or_else(|| base.join("logs")),
            config_dir: self.config_dir.unwrap_or_else(|| base.join("data")),
            history_limit: self.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            vault_root,
        })
    }
}

/// One known machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub hostname: String,
    /// `sha256:<hex>` of hostname and MAC
    pub mac_hash: String,
    pub last_seen: DateTime<Utc>,
}

/// Contents of `devices.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistry {
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Insert a device or refresh the entry with the same id
    pub fn upsert(&mut self, device: Device) {
        match self.devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// Candidate save paths for one title on one device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Paths as written, before environment expansion
    #[serde(default)]
    pub paths: Vec<String>,
    /// Index into `paths` of the path to sync
    #[serde(default)]
    pub preferred: usize,
}

/// Contents of `paths.json`: title → device id → entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRegistry {
    #[serde(default)]
    pub paths: BTreeMap<String, BTreeMap<String, PathEntry>>,
}

impl PathRegistry {
    /// Environment-expanded preferred path of a title on a device
    pub fn preferred_path(&self, title: &str, device: &str) -> Result<PathBuf> {
        let missing = |detail: String| SyncError::NoPathConfigured {
            title: title.to_string(),
            device: device.to_string(),
            detail,
        };

        let by_device = self
            .paths
            .get(title)
            .ok_or_else(|| missing("no paths configured for title".into()))?;
        let entry = by_device
            .get(device)
            .ok_or_else(|| missing("no paths configured for this device".into()))?;
        if entry.paths.is_empty() {
            return Err(missing("paths array is empty".into()));
        }
        let raw = entry
            .paths
            .get(entry.preferred)
            .ok_or_else(|| missing(format!("invalid preferred index {}", entry.preferred)))?;

        Ok(expand_env_path(raw))
    }

    /// Add a path for a title on a device
    ///
    /// Returns `false` if the path was already registered. A path added to
    /// an empty entry becomes the preferred one.
    pub fn register(&mut self, title: &str, device: &str, path: &str) -> bool {
        let entry = self
            .paths
            .entry(title.to_string())
            .or_default()
            .entry(device.to_string())
            .or_default();

        if entry
            .paths
            .iter()
            .any(|p| p == path || expand_env_path(p) == Path::new(path))
        {
            return false;
        }
        if entry.paths.is_empty() {
            entry.preferred = 0;
        }
        entry.paths.push(path.to_string());
        true
    }

    /// Titles with any registered path
    pub fn titles(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }
}

/// Contents of `rules.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            include: vec!["score.dat".into(), "scoreth*.dat".into()],
            exclude: vec!["*.tmp".into(), "_history/*".into()],
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Rules {
    /// Compile the include and exclude globs
    pub fn matcher(&self) -> Result<RuleMatcher> {
        Ok(RuleMatcher {
            include: build_globset(&self.include)?,
            exclude: build_globset(&self.exclude)?,
        })
    }
}

/// Compiled [`Rules`]
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    include: GlobSet,
    exclude: GlobSet,
}

impl RuleMatcher {
    /// Whether a vault-relative path is a sync target
    ///
    /// It must match an include glob and no exclude glob.
    pub fn is_sync_target(&self, relative: &str) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Loads and saves the JSON documents in a configuration directory
pub struct ConfigStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load_devices(&self) -> Result<DeviceRegistry> {
        self.load(DEVICES_FILE)
    }

    pub fn save_devices(&self, devices: &DeviceRegistry) -> Result<()> {
        self.save(DEVICES_FILE, devices)
    }

    pub fn load_paths(&self) -> Result<PathRegistry> {
        self.load(PATHS_FILE)
    }

    pub fn save_paths(&self, paths: &PathRegistry) -> Result<()> {
        self.save(PATHS_FILE, paths)
    }

    pub fn load_rules(&self) -> Result<Rules> {
        self.load(RULES_FILE)
    }

    pub fn save_rules(&self, rules: &Rules) -> Result<()> {
        self.save(RULES_FILE, rules)
    }

    fn load<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        if !path.exists() {
            debug!("{:?} missing, using defaults", path);
            return Ok(T::default());
        }

        let data = fs::read(&path)?;
        match serde_json::from_slice(&data) {
            Ok(doc) => Ok(doc),
            Err(source) => {
                let stamp = self.clock.now().format("%Y%m%d-%H%M%S");
                let aside = PathBuf::from(format!("{}.backup-{}", path.display(), stamp));
                let preserved_at = match atomic_copy(&path, &aside) {
                    Ok(()) => Some(aside),
                    Err(e) => {
                        warn!("Could not preserve corrupt {:?}: {}", path, e);
                        None
                    }
                };
                Err(SyncError::ConfigCorrupt {
                    path,
                    preserved_at,
                    source,
                })
            }
        }
    }

    fn save<T: Serialize>(&self, name: &str, doc: &T) -> Result<()> {
        ensure_dir(&self.dir)?;
        let data = serde_json::to_vec_pretty(doc)?;
        atomic_write(&self.dir.join(name), &data)
    }
}
