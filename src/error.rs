//! Error types for the savesync library
//!
//! This module defines every error that can surface from a comparison,
//! transfer, backup or configuration operation. Errors carry the paths
//! involved so that a batch run can log them with full context and move
//! on to the next title.
//!
//! A suspicious size ratio is deliberately absent here: it is a policy
//! decision and surfaces as a `CONFLICT` verdict, not as a failure.

use crate::types::ComparisonResult;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the savesync library
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for all savesync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// I/O errors that are not attributable to a more specific variant
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A source, target or backup was required but is absent
    #[error("File not found: {path:?}")]
    NotFound {
        /// Path that was expected to exist
        path: PathBuf,
    },

    /// The file exists but could not be read
    #[error("File not readable: {path:?}: {source}")]
    Unreadable {
        /// Path of the unreadable file
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Content hash could not be computed
    #[error("Failed to hash {path:?}: {source}")]
    HashComputation {
        /// Path being hashed
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A step of the atomic copy sequence failed; the destination is untouched
    #[error("Copy failed ({stage}) from {from:?} to {to:?}: {source}")]
    CopyFailed {
        /// Source of the copy
        from: PathBuf,
        /// Destination of the copy
        to: PathBuf,
        /// Which step of the copy failed
        stage: &'static str,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Push-time guard tripped (game running, file locked, unsupported platform)
    #[error("Cannot write {path:?}: {reason}")]
    UnsafeToWrite {
        /// Local path that was about to be written
        path: PathBuf,
        /// Machine-readable reason token
        reason: String,
    },

    /// A persisted configuration document failed to parse
    #[error("Corrupt configuration {path:?} (preserved at {preserved_at:?}): {source}")]
    ConfigCorrupt {
        /// Path of the corrupt document
        path: PathBuf,
        /// Where the corrupt bytes were copied aside, if that succeeded
        preserved_at: Option<PathBuf>,
        /// Parse failure
        #[source]
        source: serde_json::Error,
    },

    /// A pull or push failed after the comparator had decided to copy
    ///
    /// The destination is untouched; the verdict that led to the attempt is
    /// kept alongside the underlying failure.
    #[error("Transfer failed ({}): {source}", .comparison.recommendation)]
    TransferFailed {
        /// Comparison the transfer was based on
        comparison: Box<ComparisonResult>,
        /// Backup or copy failure that aborted the transfer
        #[source]
        source: Box<SyncError>,
    },

    /// Title code is not of the form `thNN`
    #[error("Invalid title code: {0}")]
    InvalidTitle(String),

    /// No local path registered for this title on this device
    #[error("No path configured for {title} on device {device}: {detail}")]
    NoPathConfigured {
        /// Title code
        title: String,
        /// Device identifier
        device: String,
        /// What exactly is missing
        detail: String,
    },

    /// Named backup does not exist in the title's history
    #[error("Backup not found for {title}: {name}")]
    BackupNotFound {
        /// Title code
        title: String,
        /// Backup filename
        name: String,
    },

    /// Push refused because the local copy looks newer than the vault
    #[error("Local file appears newer than vault: {reason}")]
    LocalNewer {
        /// Comparator reason
        reason: String,
    },

    /// Push refused because the comparator flagged a conflict
    #[error("File conflict detected: {reason}")]
    Conflict {
        /// Comparator reason
        reason: String,
    },

    /// Include/exclude pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),

    /// Custom error type for extensions
    #[error("{0}")]
    Custom(String),
}

impl From<globset::Error> for SyncError {
    fn from(err: globset::Error) -> Self {
        SyncError::InvalidPattern(err.to_string())
    }
}

impl SyncError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SyncError::Internal(msg.into())
    }

    /// Create a custom error with a custom message
    pub fn custom(msg: impl Into<String>) -> Self {
        SyncError::Custom(msg.into())
    }

    /// Create an unsafe-to-write error
    pub fn unsafe_to_write(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SyncError::UnsafeToWrite {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a backup or copy failure with the verdict that triggered it
    pub fn transfer_failed(comparison: &ComparisonResult, source: SyncError) -> Self {
        SyncError::TransferFailed {
            comparison: Box::new(comparison.clone()),
            source: Box::new(source),
        }
    }

    /// Check if `--force` would let the operation proceed
    pub fn is_user_refusal(&self) -> bool {
        matches!(
            self,
            SyncError::UnsafeToWrite { .. } | SyncError::LocalNewer { .. } | SyncError::Conflict { .. }
        )
    }

    /// Check if retrying later might succeed without user intervention
    pub fn is_recoverable(&self) -> bool {
        if let SyncError::TransferFailed { source, .. } = self {
            return source.is_recoverable();
        }
        matches!(
            self,
            SyncError::UnsafeToWrite { .. } | SyncError::Unreadable { .. } | SyncError::CopyFailed { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SyncError::UnsafeToWrite { reason, .. } => {
                format!("cannot push: {} (use --force to override)", reason)
            }
            SyncError::LocalNewer { .. } => {
                "local file appears newer than vault, skipping push (use --force to override)".to_string()
            }
            SyncError::Conflict { reason } => {
                format!("file conflict detected: {} (use --force to override)", reason)
            }
            SyncError::NoPathConfigured { title, .. } => {
                format!("no path configured for {}. Run 'savesync detect' first.", title)
            }
            SyncError::BackupNotFound { title, name } => {
                format!("backup '{}' not found. Use 'savesync backup {} --list' to see available backups.", name, title)
            }
            SyncError::ConfigCorrupt { path, preserved_at: Some(saved), .. } => {
                format!("failed to parse {:?} (backed up to {:?})", path, saved)
            }
            SyncError::TransferFailed { source, .. } => source.user_message(),
            _ => self.to_string(),
        }
    }
}
