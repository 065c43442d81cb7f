//! Content-addressed archiving of replays and snapshots
//!
//! The game keeps replays in a `replay/` directory and screenshots in a
//! `snapshot/` directory next to the save file. After each pull those files
//! are copied into `<vault>/<title>/replay/` and `<vault>/<title>/snapshot/`
//! at most once per distinct content: a file whose SHA-256 already appears
//! in the archive is skipped, whatever its name.
//!
//! Archived names are prefixed with the source's modification time,
//! `YYYY-MM-DD_HH-MM-SS_<name>`, so the archive reads chronologically.
//! A different file that would land on an existing name gets a sequence
//! after the timestamp instead: `YYYY-MM-DD_HH-MM-SS.01_<name>`.
//!
//! Failures on individual files are reported as events and skipped; they
//! never fail the pass.

use crate::error::Result;
use crate::events::{Event, EventSink};
use crate::clock::Clock;
use crate::types::{ArchiveReport, ArtifactKind};
use crate::utils::{atomic_copy, ensure_dir, hash_file_content, list_files_with_extension, TEMP_PREFIX};
use crate::vault::VaultLayout;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Copies auxiliary artifacts into the vault, deduplicated by content
pub struct Archiver {
    layout: VaultLayout,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl Archiver {
    pub fn new(layout: VaultLayout, sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self { layout, sink, clock }
    }

    /// Archive the artifacts of `kind` sitting beside `local_save`
    ///
    /// A missing source directory or an empty one is reported as an event
    /// and yields an empty report.
    #[instrument(skip(self))]
    pub fn archive_beside(&self, title: &str, kind: ArtifactKind, local_save: &Path) -> Result<ArchiveReport> {
        let source_dir = kind.source_dir_for(local_save);
        self.archive_dir(title, kind, &source_dir)
    }

    /// Archive every `*.<ext>` file directly inside `source_dir`
    pub fn archive_dir(&self, title: &str, kind: ArtifactKind, source_dir: &Path) -> Result<ArchiveReport> {
        let mut report = ArchiveReport::default();

        if !source_dir.is_dir() {
            self.emit(
                Event::info(format!("{}_dir_not_found", kind))
                    .field("title", title)
                    .path("path", source_dir),
            );
            return Ok(report);
        }
        report.source_found = true;

        let files = list_files_with_extension(source_dir, kind.extension())?;
        if files.is_empty() {
            self.emit(Event::info(format!("no_{}_files", kind)).field("title", title));
            return Ok(report);
        }

        let archive_dir = self.layout.archive_dir(title, kind);
        ensure_dir(&archive_dir)?;
        let mut known = archived_hashes(&archive_dir)?;

        for name in files {
            let src = source_dir.join(&name);

            let hash = match hash_file_content(&src) {
                Ok(hash) => hash,
                Err(e) => {
                    self.emit_file_failure(kind, "hash_failed", title, &name, &e.to_string(), false);
                    report.failed += 1;
                    continue;
                }
            };

            if known.contains(&hash) {
                debug!("{} already archived", name);
                report.skipped += 1;
                continue;
            }

            let modified = match fs::metadata(&src).and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) => {
                    self.emit_file_failure(kind, "stat_failed", title, &name, &e.to_string(), false);
                    report.failed += 1;
                    continue;
                }
            };

            let dest = unique_archive_path(&archive_dir, &modified, &name);
            if let Err(e) = atomic_copy(&src, &dest) {
                self.emit_file_failure(kind, "archive_failed", title, &name, &e.to_string(), true);
                report.failed += 1;
                continue;
            }

            known.insert(hash);
            report.archived += 1;
        }

        self.emit(
            Event::info(format!("{}_archive_complete", kind))
                .field("title", title)
                .field("archived", report.archived)
                .field("skipped", report.skipped)
                .field("failed", report.failed),
        );

        Ok(report)
    }

    fn emit(&self, event: Event) {
        self.sink.record(event.at(self.clock.now()));
    }

    fn emit_file_failure(&self, kind: ArtifactKind, what: &str, title: &str, file: &str, error: &str, is_error: bool) {
        let msg = format!("{}_{}", kind, what);
        let event = if is_error { Event::error(msg) } else { Event::warn(msg) };
        self.emit(event.field("title", title).field("file", file).field("error", error));
    }
}

/// Hashes of every file already in the archive
fn archived_hashes(archive_dir: &Path) -> Result<HashSet<String>> {
    let mut hashes = HashSet::new();
    for entry in fs::read_dir(archive_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        // An unhashable archive entry simply cannot match.
        if let Ok(hash) = hash_file_content(&entry.path()) {
            hashes.insert(hash);
        }
    }
    Ok(hashes)
}

fn unique_archive_path(archive_dir: &Path, modified: &DateTime<Utc>, name: &str) -> PathBuf {
    let stamp = modified.format(ARCHIVE_TIMESTAMP_FORMAT).to_string();
    let first = archive_dir.join(format!("{}_{}", stamp, name));
    if !first.exists() {
        return first;
    }

    let mut seq = 1u32;
    loop {
        let candidate = archive_dir.join(format!("{}.{:02}_{}", stamp, seq, name));
        if !candidate.exists() {
            return candidate;
        }
        seq += 1;
    }
}
