//! Core data types shared by the comparator, the transfer orchestrator and
//! the backup store
//!
//! ## Overview
//!
//! - **Snapshots**: [`FileMetadata`] describes one file at one location at
//!   one instant. It is produced fresh for every comparison and never cached.
//! - **Verdicts**: [`ComparisonResult`] and [`Recommendation`] are the
//!   comparator's output, consumed immediately by the caller.
//! - **History**: [`BackupEntry`] describes one retained prior version.
//! - **Archiving**: [`ArtifactKind`] and [`ArchiveReport`] describe the
//!   content-addressed archive of replays and snapshots.
//!
//! ## Examples
//!
//! ```rust
//! use savesync::types::{FileMetadata, Recommendation};
//! use chrono::{TimeZone, Utc};
//!
//! let when = Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap();
//! let meta = FileMetadata::present("/saves/score.dat", 1024, when, "ab12cd34ef56aa");
//! assert_eq!(meta.short_hash(), "ab12cd34ef56");
//! assert_eq!(Recommendation::Pull.to_string(), "PULL");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Metadata of one file at one location
///
/// `hash` is `None` whenever the file is absent or unreadable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Whether anything exists at `path`
    pub exists: bool,
    /// Whether the file could be opened for reading
    pub readable: bool,
    /// Size in bytes
    pub size: u64,
    /// Last modification time, normalized to UTC
    pub modified: DateTime<Utc>,
    /// SHA-256 of the content, lowercase hex
    pub hash: Option<String>,
}

impl FileMetadata {
    /// Metadata for a path where nothing exists
    pub fn absent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            readable: false,
            size: 0,
            modified: DateTime::<Utc>::UNIX_EPOCH,
            hash: None,
        }
    }

    /// Metadata for a file that exists but cannot be read
    pub fn unreadable(path: impl Into<PathBuf>, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            exists: true,
            readable: false,
            size,
            modified,
            hash: None,
        }
    }

    /// Metadata for a readable file with a known content hash
    pub fn present(
        path: impl Into<PathBuf>,
        size: u64,
        modified: DateTime<Utc>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            exists: true,
            readable: true,
            size,
            modified,
            hash: Some(hash.into()),
        }
    }

    /// First 12 characters of the hash for display
    pub fn short_hash(&self) -> &str {
        match &self.hash {
            Some(hash) if hash.len() > 12 => &hash[..12],
            Some(hash) => hash,
            None => "",
        }
    }

    /// Whether the file exists and could be read
    pub fn is_usable(&self) -> bool {
        self.exists && self.readable
    }
}

/// Comparator verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    /// Nothing to do
    Skip,
    /// Local is authoritative: copy local → vault
    Pull,
    /// Vault is authoritative: copy vault → local
    Push,
    /// Evidence is contradictory or suspicious; a human must decide
    Conflict,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Skip => "SKIP",
            Recommendation::Pull => "PULL",
            Recommendation::Push => "PUSH",
            Recommendation::Conflict => "CONFLICT",
        };
        f.write_str(s)
    }
}

/// Which side one evidence signal favors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    /// The local copy
    Local,
    /// The vault copy
    Remote,
    /// Inconclusive
    Equal,
}

/// Output of [`crate::comparator::compare`]
///
/// Immutable once produced. The reason is written for both the log and the
/// terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonResult {
    /// Snapshot of the local file
    pub local: FileMetadata,
    /// Snapshot of the vault file
    pub remote: FileMetadata,
    /// Whether both content hashes are equal
    pub hash_match: bool,
    /// Local size minus remote size
    pub size_diff: i64,
    /// Local mtime minus remote mtime, in whole seconds
    pub time_diff: i64,
    /// Verdict
    pub recommendation: Recommendation,
    /// Human-readable justification
    pub reason: String,
}

impl ComparisonResult {
    /// Whether the verdict is a conflict
    pub fn is_conflict(&self) -> bool {
        self.recommendation == Recommendation::Conflict
    }
}

/// Direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local → vault
    Pull,
    /// Vault → local
    Push,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Pull => f.write_str("pull"),
            Direction::Push => f.write_str("push"),
        }
    }
}

/// Result of one orchestrated transfer
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Verdict the decision was based on
    pub comparison: ComparisonResult,
    /// Whether the destination was overwritten
    pub copied: bool,
    /// Backup taken of the destination before it was overwritten
    pub backup: Option<PathBuf>,
}

impl TransferOutcome {
    pub(crate) fn untouched(comparison: ComparisonResult) -> Self {
        Self {
            comparison,
            copied: false,
            backup: None,
        }
    }
}

/// One retained historical copy in a title's `_history` directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupEntry {
    /// Filename, `<timestamp>-<original name>`
    pub name: String,
    /// Full path of the backup
    pub path: PathBuf,
    /// Timestamp parsed from the filename, when it parses
    pub timestamp: Option<DateTime<Utc>>,
    /// Size in bytes, zero when the entry could not be stat'ed
    pub size: u64,
    /// Why the entry could not be stat'ed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Auxiliary per-title artifacts archived by content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Replay recordings (`*.rpy`)
    Replay,
    /// Screenshots (`*.bmp`)
    Snapshot,
}

impl ArtifactKind {
    /// Extension of the files this kind archives, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Replay => "rpy",
            ArtifactKind::Snapshot => "bmp",
        }
    }

    /// Directory name used beside the save file and inside the vault
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Replay => "replay",
            ArtifactKind::Snapshot => "snapshot",
        }
    }

    /// Directory holding these artifacts next to a local save file
    pub fn source_dir_for(&self, save_file: &Path) -> PathBuf {
        save_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(self.dir_name())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Statistics from one archiving pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Files newly copied into the archive
    pub archived: usize,
    /// Files whose content was already archived
    pub skipped: usize,
    /// Files that could not be hashed, stat'ed or copied
    pub failed: usize,
    /// Whether the source directory existed at all
    pub source_found: bool,
}
