//! Per-title version history
//!
//! Every destructive overwrite is preceded by a copy of the file about to be
//! replaced into `<vault>/<title>/_history/`. Backup names embed a
//! fixed-width UTC timestamp so that sorting names in descending order lists
//! backups newest first:
//!
//! ```text
//! 2025-12-01T12-00-05Z-score.dat
//! 2025-12-01T12-00-00Z.01-score.dat   second backup within the same second
//! 2025-12-01T12-00-00Z-score.dat
//! ```
//!
//! History is append-only apart from [`BackupStore::cleanup_old_backups`],
//! which drops the oldest entries beyond a retention limit.

use crate::clock::Clock;
use crate::error::{Result, SyncError};
use crate::types::BackupEntry;
use crate::utils::{atomic_copy, ensure_dir, TEMP_PREFIX};
use crate::vault::VaultLayout;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Timestamp format used at the start of every backup name
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Length of a formatted backup timestamp
const TIMESTAMP_LEN: usize = 20;

/// Highest same-second sequence number before giving up
const MAX_SEQUENCE: u32 = 99;

/// Creates, lists, restores and trims backups
#[derive(Clone)]
pub struct BackupStore {
    layout: VaultLayout,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BackupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupStore")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl BackupStore {
    /// Create a store over the given vault layout
    pub fn new(layout: VaultLayout, clock: Arc<dyn Clock>) -> Self {
        Self { layout, clock }
    }

    /// Vault layout this store writes into
    pub fn layout(&self) -> &VaultLayout {
        &self.layout
    }

    /// Copy `source` into the title's history
    ///
    /// Returns the path of the new backup.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotFound`] if `source` does not exist
    /// - [`SyncError::Unreadable`] if `source` cannot be opened
    /// - [`SyncError::CopyFailed`] if the copy itself fails
    #[instrument(skip(self))]
    pub fn create_backup(&self, title: &str, source: &Path) -> Result<PathBuf> {
        if !source.exists() {
            return Err(SyncError::NotFound {
                path: source.to_path_buf(),
            });
        }
        if let Err(e) = File::open(source) {
            return Err(SyncError::Unreadable {
                path: source.to_path_buf(),
                source: e,
            });
        }

        let history_dir = self.layout.history_dir(title);
        ensure_dir(&history_dir)?;

        let base_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SyncError::internal(format!("{:?} has no file name", source)))?;

        let backup_path = self.next_backup_path(&history_dir, &base_name)?;
        atomic_copy(source, &backup_path)?;

        info!("Created backup {:?}", backup_path);
        Ok(backup_path)
    }

    /// Names of all backups for a title, newest first
    ///
    /// A title with no history directory yet has no backups.
    pub fn list_backups(&self, title: &str) -> Result<Vec<String>> {
        let history_dir = self.layout.history_dir(title);
        if !history_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&history_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            names.push(name);
        }

        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Backups with parsed timestamps and sizes, newest first
    ///
    /// An entry that cannot be stat'ed is still listed, with a zero size and
    /// the failure in [`BackupEntry::error`].
    pub fn backup_details(&self, title: &str) -> Result<Vec<BackupEntry>> {
        let history_dir = self.layout.history_dir(title);

        let details = self
            .list_backups(title)?
            .into_iter()
            .map(|name| {
                let path = history_dir.join(&name);
                let (size, error) = match fs::metadata(&path) {
                    Ok(meta) => (meta.len(), None),
                    Err(e) => {
                        warn!("Cannot stat backup {:?}: {}", path, e);
                        (0, Some(e.to_string()))
                    }
                };
                BackupEntry {
                    timestamp: parse_backup_timestamp(&name),
                    name,
                    path,
                    size,
                    error,
                }
            })
            .collect();
        Ok(details)
    }

    /// Copy a named backup over `target`
    ///
    /// An existing target is backed up first, so a restore can itself be
    /// undone.
    ///
    /// # Errors
    ///
    /// - [`SyncError::BackupNotFound`] if no backup has that name
    /// - [`SyncError::Unreadable`] if the backup cannot be opened
    #[instrument(skip(self))]
    pub fn restore_backup(&self, title: &str, backup_name: &str, target: &Path) -> Result<Option<PathBuf>> {
        let backup_path = self.layout.history_dir(title).join(backup_name);

        if backup_name.contains(['/', '\\']) || !backup_path.is_file() {
            return Err(SyncError::BackupNotFound {
                title: title.to_string(),
                name: backup_name.to_string(),
            });
        }
        if let Err(e) = File::open(&backup_path) {
            return Err(SyncError::Unreadable {
                path: backup_path,
                source: e,
            });
        }

        let safety_copy = if target.exists() {
            Some(self.create_backup(title, target)?)
        } else {
            None
        };

        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        atomic_copy(&backup_path, target)?;

        info!("Restored {} over {:?}", backup_name, target);
        Ok(safety_copy)
    }

    /// Keep the `limit` newest backups and delete the rest
    ///
    /// Returns how many backups were deleted.
    #[instrument(skip(self))]
    pub fn cleanup_old_backups(&self, title: &str, limit: usize) -> Result<usize> {
        let names = self.list_backups(title)?;
        if names.len() <= limit {
            return Ok(0);
        }

        let history_dir = self.layout.history_dir(title);
        let mut removed = 0;
        for name in &names[limit..] {
            fs::remove_file(history_dir.join(name))?;
            debug!("Removed old backup {}", name);
            removed += 1;
        }

        info!("Trimmed {} backups for {} (limit {})", removed, title, limit);
        Ok(removed)
    }

    fn next_backup_path(&self, history_dir: &Path, base_name: &str) -> Result<PathBuf> {
        let stamp = self.clock.now().format(BACKUP_TIMESTAMP_FORMAT).to_string();

        let first = history_dir.join(format!("{}-{}", stamp, base_name));
        if !first.exists() {
            return Ok(first);
        }

        for seq in 1..=MAX_SEQUENCE {
            let candidate = history_dir.join(format!("{}.{:02}-{}", stamp, seq, base_name));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(SyncError::internal(format!(
            "too many backups of {} within {}",
            base_name, stamp
        )))
    }
}

/// Parse the timestamp at the start of a backup name
///
/// Returns `None` for names that do not start with a backup timestamp.
pub fn parse_backup_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let prefix = name.get(..TIMESTAMP_LEN)?;
    NaiveDateTime::parse_from_str(prefix, BACKUP_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
