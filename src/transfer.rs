//! Transfer orchestration
//!
//! The [`Orchestrator`] turns a comparator verdict into a file operation. It
//! fetches fresh metadata for both sides, compares them, and copies only
//! when the verdict matches the requested direction or the caller forces
//! it. Whatever is about to be overwritten is copied into the title's
//! history first, and the copy itself goes through
//! [`atomic_copy`](crate::utils::atomic_copy).
//!
//! ## Pull (local → vault)
//!
//! | verdict    | action                                   |
//! |------------|------------------------------------------|
//! | `PULL`     | back up vault copy, copy local over it   |
//! | other      | nothing; the verdict is returned         |
//!
//! ## Push (vault → local)
//!
//! The [`SafetyOracle`] is consulted before anything else.
//!
//! | verdict    | without `force`          | with `force`  |
//! |------------|--------------------------|---------------|
//! | `PUSH`     | back up local, copy      | same          |
//! | `SKIP`     | nothing                  | nothing       |
//! | `PULL`     | [`SyncError::LocalNewer`]| copy anyway   |
//! | `CONFLICT` | [`SyncError::Conflict`]  | copy anyway   |

use crate::backup::BackupStore;
use crate::comparator::compare;
use crate::error::{Result, SyncError};
use crate::metadata::MetadataProvider;
use crate::safety::SafetyOracle;
use crate::types::{ComparisonResult, FileMetadata, Recommendation, TransferOutcome};
use crate::utils::{atomic_copy, ensure_dir};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Performs pulls and pushes for single titles
pub struct Orchestrator {
    metadata: Arc<dyn MetadataProvider>,
    backups: BackupStore,
    oracle: Arc<dyn SafetyOracle>,
}

impl Orchestrator {
    pub fn new(metadata: Arc<dyn MetadataProvider>, backups: BackupStore, oracle: Arc<dyn SafetyOracle>) -> Self {
        Self {
            metadata,
            backups,
            oracle,
        }
    }

    /// Backup store used before every overwrite
    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Compare the current state of a local file and its vault copy
    pub fn compare(&self, local: &Path, vault: &Path) -> Result<ComparisonResult> {
        let local_meta = self.metadata.stat(local)?;
        let vault_meta = self.metadata.stat(vault)?;
        Ok(compare(&local_meta, &vault_meta))
    }

    /// Copy the local file into the vault when the comparator says `PULL`
    ///
    /// Any other verdict is returned untouched for the caller to act on.
    /// When the backup or the copy fails, the verdict travels with the
    /// failure in [`SyncError::TransferFailed`].
    #[instrument(skip(self))]
    pub fn pull(&self, title: &str, local: &Path, vault: &Path) -> Result<TransferOutcome> {
        let comparison = self.compare(local, vault)?;

        if comparison.recommendation != Recommendation::Pull {
            debug!("Pull of {} not performed: {}", title, comparison.recommendation);
            return Ok(TransferOutcome::untouched(comparison));
        }

        let backup = self
            .overwrite(title, local, vault, &comparison.remote)
            .map_err(|e| SyncError::transfer_failed(&comparison, e))?;
        info!("Pulled {} into vault", title);
        Ok(TransferOutcome {
            comparison,
            copied: true,
            backup,
        })
    }

    /// Copy the local file into the vault regardless of the verdict
    ///
    /// Used when the user resolves a pull conflict in favor of the local
    /// copy.
    #[instrument(skip(self))]
    pub fn force_pull(&self, title: &str, local: &Path, vault: &Path) -> Result<TransferOutcome> {
        let comparison = self.compare(local, vault)?;
        require_source(&comparison.local)?;

        let backup = self
            .overwrite(title, local, vault, &comparison.remote)
            .map_err(|e| SyncError::transfer_failed(&comparison, e))?;
        info!("Force-pulled {} into vault", title);
        Ok(TransferOutcome {
            comparison,
            copied: true,
            backup,
        })
    }

    /// Copy the vault file over the local save
    ///
    /// # Errors
    ///
    /// - [`SyncError::UnsafeToWrite`] if the safety oracle refuses and
    ///   `force` is not set; no I/O has happened
    /// - [`SyncError::LocalNewer`] or [`SyncError::Conflict`] if the verdict
    ///   argues against the push and `force` is not set
    /// - [`SyncError::TransferFailed`] if the backup or the copy fails
    #[instrument(skip(self))]
    pub fn push(&self, title: &str, vault: &Path, local: &Path, force: bool) -> Result<TransferOutcome> {
        let verdict = self.oracle.check(local, title)?;
        if !verdict.safe {
            if !force {
                return Err(SyncError::unsafe_to_write(local, verdict.reason));
            }
            warn!("Pushing {} despite {} (forced)", title, verdict.reason);
        }

        let comparison = self.compare(local, vault)?;

        match comparison.recommendation {
            Recommendation::Push => {}
            Recommendation::Skip => return Ok(TransferOutcome::untouched(comparison)),
            Recommendation::Pull if !force => {
                return Err(SyncError::LocalNewer {
                    reason: comparison.reason,
                })
            }
            Recommendation::Conflict if !force => {
                return Err(SyncError::Conflict {
                    reason: comparison.reason,
                })
            }
            Recommendation::Pull | Recommendation::Conflict => {
                warn!("Forcing push of {}: {}", title, comparison.reason);
            }
        }

        require_source(&comparison.remote)?;
        let backup = self
            .overwrite(title, vault, local, &comparison.local)
            .map_err(|e| SyncError::transfer_failed(&comparison, e))?;
        info!("Pushed {} to local", title);
        Ok(TransferOutcome {
            comparison,
            copied: true,
            backup,
        })
    }

    /// Back up `dest` if it holds a readable file, then copy `src` over it
    fn overwrite(&self, title: &str, src: &Path, dest: &Path, dest_meta: &FileMetadata) -> Result<Option<PathBuf>> {
        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }

        let backup = if dest_meta.is_usable() {
            Some(self.backups.create_backup(title, dest)?)
        } else {
            None
        };

        atomic_copy(src, dest)?;
        Ok(backup)
    }
}

fn require_source(source: &FileMetadata) -> Result<()> {
    if !source.exists {
        return Err(SyncError::NotFound {
            path: source.path.clone(),
        });
    }
    if !source.readable {
        return Err(SyncError::Unreadable {
            path: source.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "source not readable"),
        });
    }
    Ok(())
}
