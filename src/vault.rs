//! Vault directory layout
//!
//! ```text
//! <vault>/
//! └── th08/
//!     ├── main/score.dat      canonical copy
//!     ├── _history/           timestamped backups
//!     ├── replay/             archived *.rpy
//!     └── snapshot/           archived *.bmp
//! ```

use crate::types::ArtifactKind;
use std::path::{Path, PathBuf};

/// Name of the per-title history directory
pub const HISTORY_DIR: &str = "_history";

/// Name of the per-title directory holding the canonical file
pub const MAIN_DIR: &str = "main";

/// Resolves vault paths for titles
#[derive(Debug, Clone)]
pub struct VaultLayout {
    root: PathBuf,
}

impl VaultLayout {
    /// Create a layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Vault root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<vault>/<title>`
    pub fn title_dir(&self, title: &str) -> PathBuf {
        self.root.join(title)
    }

    /// `<vault>/<title>/main`
    pub fn main_dir(&self, title: &str) -> PathBuf {
        self.title_dir(title).join(MAIN_DIR)
    }

    /// `<vault>/<title>/main/<file_name>`
    pub fn main_file(&self, title: &str, file_name: &str) -> PathBuf {
        self.main_dir(title).join(file_name)
    }

    /// `<vault>/<title>/_history`
    pub fn history_dir(&self, title: &str) -> PathBuf {
        self.title_dir(title).join(HISTORY_DIR)
    }

    /// `<vault>/<title>/replay` or `<vault>/<title>/snapshot`
    pub fn archive_dir(&self, title: &str, kind: ArtifactKind) -> PathBuf {
        self.title_dir(title).join(kind.dir_name())
    }
}
