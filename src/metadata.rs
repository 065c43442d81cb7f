//! Fresh file metadata snapshots
//!
//! The comparator never touches the filesystem. Callers obtain a
//! [`FileMetadata`] for each side from a [`MetadataProvider`] immediately
//! before comparing, and must fetch new ones after any mutation.

use crate::error::Result;
use crate::types::FileMetadata;
use crate::utils::hash_file_content;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::{debug, trace};

/// Produces metadata for a path
pub trait MetadataProvider: Send + Sync {
    /// Describe the file at `path` as it is right now
    ///
    /// An absent or unreadable file is not an error; it is reported through
    /// the `exists`/`readable` flags.
    fn stat(&self, path: &Path) -> Result<FileMetadata>;
}

/// Reads metadata and content hashes from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMetadataProvider;

impl MetadataProvider for FsMetadataProvider {
    fn stat(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // A dangling symlink still counts as something being there.
                if fs::symlink_metadata(path).is_ok() {
                    debug!("Dangling link at {:?}", path);
                    return Ok(FileMetadata::unreadable(path, 0, DateTime::<Utc>::UNIX_EPOCH));
                }
                return Ok(FileMetadata::absent(path));
            }
            Err(e) => {
                debug!("Cannot stat {:?}: {}", path, e);
                return Ok(FileMetadata::unreadable(path, 0, DateTime::<Utc>::UNIX_EPOCH));
            }
        };

        let size = metadata.len();
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        if !metadata.is_file() || File::open(path).is_err() {
            return Ok(FileMetadata::unreadable(path, size, modified));
        }

        match hash_file_content(path) {
            Ok(hash) => {
                trace!("Stat {:?}: {} bytes, hash {}", path, size, &hash[..12]);
                Ok(FileMetadata::present(path, size, modified, hash))
            }
            Err(e) => {
                debug!("Hash failed for {:?}: {}", path, e);
                Ok(FileMetadata::unreadable(path, size, modified))
            }
        }
    }
}
