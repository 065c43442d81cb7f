//! Utility functions for savesync
//!
//! File hashing, the crash-safe copy primitive every mutating path goes
//! through, directory listing, environment expansion and byte formatting.
//!
//! ## Atomic copy
//!
//! ```rust,no_run
//! use savesync::utils::atomic_copy;
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! atomic_copy(Path::new("local/score.dat"), Path::new("vault/th08/main/score.dat"))?;
//! # Ok(())
//! # }
//! ```
//!
//! The destination is either the old file or the complete new file. It is
//! never observed half written, and a failed copy leaves no temporary file
//! behind.

use crate::error::{Result, SyncError};
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::trace;
use walkdir::WalkDir;

/// Prefix of temporary files created next to a copy destination
pub const TEMP_PREFIX: &str = ".tmp-";

/// Hash a file's content using SHA-256
///
/// Streams the file through an 8KB buffer and returns the digest as a
/// 64-character lowercase hex string.
///
/// # Errors
///
/// - [`SyncError::HashComputation`] if the file cannot be opened or read
pub fn hash_file_content(path: &Path) -> Result<String> {
    let hash_err = |source| SyncError::HashComputation {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(hash_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(hash_err)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash arbitrary data using SHA-256
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Create a directory and all its parents if missing
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Copy `src` onto `dest` atomically
///
/// Opens the source, streams it into a temporary file created in the
/// destination's directory, syncs it, copies the source's permission bits
/// onto it and renames it over `dest`.
///
/// # Errors
///
/// - [`SyncError::CopyFailed`] naming the failed stage. The destination is
///   untouched and the temporary file has been removed.
pub fn atomic_copy(src: &Path, dest: &Path) -> Result<()> {
    let copy_err = |stage, source| SyncError::CopyFailed {
        from: src.to_path_buf(),
        to: dest.to_path_buf(),
        stage,
        source,
    };

    let source = File::open(src).map_err(|e| copy_err("open source", e))?;
    let permissions = source
        .metadata()
        .map_err(|e| copy_err("stat source", e))?
        .permissions();

    write_atomically(source, src, dest, Some(permissions))
}

/// Stream `reader` into `dest` through a same-directory temporary file
///
/// `origin` is only used to label errors.
pub(crate) fn write_atomically<R: Read>(
    mut reader: R,
    origin: &Path,
    dest: &Path,
    permissions: Option<fs::Permissions>,
) -> Result<()> {
    let copy_err = |stage, source| SyncError::CopyFailed {
        from: origin.to_path_buf(),
        to: dest.to_path_buf(),
        stage,
        source,
    };

    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Dropping the temp file on any early return deletes it.
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| copy_err("create temp", e))?;

    io::copy(&mut reader, temp.as_file_mut()).map_err(|e| copy_err("copy data", e))?;
    temp.as_file().sync_all().map_err(|e| copy_err("sync temp", e))?;

    if let Some(permissions) = permissions {
        fs::set_permissions(temp.path(), permissions).map_err(|e| copy_err("set permissions", e))?;
    }

    temp.persist(dest).map_err(|e| copy_err("rename", e.error))?;
    trace!("Atomically copied {:?} -> {:?}", origin, dest);

    Ok(())
}

/// Write bytes atomically (temporary file then rename)
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    write_atomically(content, path, path, None)
}

/// List the regular files directly inside `dir` with the given extension
///
/// The extension is matched case-insensitively and given without the dot.
/// Names are returned sorted.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => SyncError::Io(io),
            None => SyncError::internal(format!("failed to list {:?}", dir)),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let matches = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if matches {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    names.sort();
    Ok(names)
}

/// Expand `$VAR`, `${VAR}` and `%VAR%` references from the environment
///
/// Unknown variables expand to the empty string for the `$` forms and are
/// left untouched for the `%` form.
pub fn expand_env_path(path: &str) -> PathBuf {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)|%([A-Za-z_][A-Za-z0-9_()]*)%")
            .expect("static pattern is valid")
    });

    let expanded = pattern.replace_all(path, |caps: &Captures| {
        if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
            std::env::var(name.as_str()).unwrap_or_default()
        } else {
            let name = &caps[3];
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        }
    });

    PathBuf::from(expanded.into_owned())
}

/// Format bytes in human-readable form
///
/// ```rust
/// use savesync::utils::format_bytes;
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
