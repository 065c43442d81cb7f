//! Batch runner
//!
//! A [`SyncSession`] ties the pieces together for one device: it resolves
//! each title's local and vault paths, runs the orchestrator, asks the
//! conflict resolver when a pull conflicts, archives replays and snapshots,
//! trims history and reports every outcome to the event sink.
//!
//! Titles run one after another. An error on one title is recorded as a
//! `<op>_error` event and counted; the batch carries on with the next title.
//!
//! ## Example
//!
//! ```rust,no_run
//! use savesync::config::{ConfigStore, SyncConfig};
//! use savesync::clock::SystemClock;
//! use savesync::session::SyncSession;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::under("/mnt/usb/savesync".as_ref());
//! let paths = ConfigStore::new(&config.config_dir, Arc::new(SystemClock)).load_paths()?;
//!
//! let session = SyncSession::builder(config)
//!     .device_id("3f9a1c0b22de")
//!     .paths(paths)
//!     .build();
//!
//! let report = session.pull("all")?;
//! println!("{} pulled, {} failed", report.summary.succeeded, report.summary.failed);
//! # Ok(())
//! # }
//! ```

use crate::archive::Archiver;
use crate::backup::BackupStore;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigStore, PathRegistry, SyncConfig};
use crate::conflict::{ConflictChoice, ConflictResolver, ScriptedResolver};
use crate::device::DeviceIdentity;
use crate::error::{Result, SyncError};
use crate::events::{Event, EventSink, TracingSink};
use crate::metadata::{FsMetadataProvider, MetadataProvider};
use crate::safety::{SafetyOracle, SystemSafetyOracle};
use crate::titles::{save_file_name, sort_by_release, validate_title_code, DetectCandidate};
use crate::transfer::Orchestrator;
use crate::types::{ArchiveReport, ArtifactKind, ComparisonResult, Direction, Recommendation, TransferOutcome};
use crate::vault::VaultLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Target meaning every configured title
pub const ALL_TITLES: &str = "all";

/// Per-outcome counters for a batch
///
/// Every title lands in exactly one of `succeeded`, `skipped`, `cancelled`
/// or `failed`. `conflicts` additionally counts titles whose comparison was
/// a conflict, however it was then settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Titles whose destination was overwritten
    pub succeeded: usize,
    /// Titles left alone, including conflicts settled for the vault copy
    pub skipped: usize,
    /// Titles whose comparison came out as a conflict
    pub conflicts: usize,
    /// Titles whose conflict prompt was cancelled
    pub cancelled: usize,
    /// Titles that ended in an error
    pub failed: usize,
}

impl BatchSummary {
    /// Number of titles processed
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.cancelled + self.failed
    }
}

/// What happened to one title
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleAction {
    /// The destination was overwritten
    Copied,
    /// Nothing to do, or the verdict pointed the other way
    Skipped,
    /// Conflict settled in favor of the local copy
    ResolvedLocal,
    /// Conflict settled in favor of the vault copy
    ResolvedRemote,
    /// Conflict prompt cancelled
    Cancelled,
}

/// Result of one title within a batch
#[derive(Debug)]
pub struct TitleReport {
    /// Title code
    pub title: String,
    /// How the title was handled, or why it failed
    pub outcome: Result<TitleOutcome>,
}

/// Successful handling of one title
#[derive(Debug, Clone)]
pub struct TitleOutcome {
    /// Save file on this device
    pub local_path: PathBuf,
    /// Authoritative copy in the vault
    pub vault_path: PathBuf,
    /// Verdict the action was based on
    pub comparison: ComparisonResult,
    /// What was done
    pub action: TitleAction,
    /// Backup taken before the destination was overwritten
    pub backup: Option<PathBuf>,
    /// Replay and snapshot archiving passes that completed
    pub archives: Vec<(ArtifactKind, ArchiveReport)>,
}

/// Results of a batch
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Per-title results in processing order
    pub titles: Vec<TitleReport>,
    /// Counters over `titles`
    pub summary: BatchSummary,
}

impl BatchReport {
    fn add(&mut self, report: TitleReport) {
        match &report.outcome {
            Ok(outcome) => {
                if outcome.comparison.is_conflict() {
                    self.summary.conflicts += 1;
                }
                match outcome.action {
                    TitleAction::Copied | TitleAction::ResolvedLocal => self.summary.succeeded += 1,
                    TitleAction::Skipped | TitleAction::ResolvedRemote => self.summary.skipped += 1,
                    TitleAction::Cancelled => self.summary.cancelled += 1,
                }
            }
            Err(e) => {
                if matches!(e, SyncError::Conflict { .. }) {
                    self.summary.conflicts += 1;
                }
                self.summary.failed += 1;
            }
        }
        self.titles.push(report);
    }
}

/// Current state of one title, without side effects
#[derive(Debug, Clone)]
pub struct TitleStatus {
    /// Title code
    pub title: String,
    /// Save file on this device
    pub local_path: PathBuf,
    /// Authoritative copy in the vault
    pub vault_path: PathBuf,
    /// Fresh comparison of both sides
    pub comparison: ComparisonResult,
}

/// Runs status, pull and push for the titles configured on one device
pub struct SyncSession {
    config: SyncConfig,
    layout: VaultLayout,
    device_id: String,
    paths: PathRegistry,
    orchestrator: Orchestrator,
    archiver: Archiver,
    resolver: Arc<dyn ConflictResolver>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl SyncSession {
    pub fn builder(config: SyncConfig) -> SyncSessionBuilder {
        SyncSessionBuilder::new(config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn backups(&self) -> &BackupStore {
        self.orchestrator.backups()
    }

    /// Titles addressed by `target`: one code, or `all` configured titles
    /// in release order
    pub fn targets(&self, target: &str) -> Result<Vec<String>> {
        if target == ALL_TITLES {
            return Ok(sort_by_release(self.paths.titles()));
        }
        validate_title_code(target)?;
        Ok(vec![target.to_string()])
    }

    /// Local save path and vault path of a title
    pub fn resolve_paths(&self, title: &str) -> Result<(PathBuf, PathBuf)> {
        let local = self.paths.preferred_path(title, &self.device_id)?;
        let vault = self.layout.main_file(title, save_file_name(title));
        Ok((local, vault))
    }

    /// Compare one title's copies
    pub fn status_title(&self, title: &str) -> Result<TitleStatus> {
        let (local_path, vault_path) = self.resolve_paths(title)?;
        let comparison = self.orchestrator.compare(&local_path, &vault_path)?;
        Ok(TitleStatus {
            title: title.to_string(),
            local_path,
            vault_path,
            comparison,
        })
    }

    /// Compare every targeted title
    pub fn status(&self, target: &str) -> Result<Vec<(String, Result<TitleStatus>)>> {
        Ok(self
            .targets(target)?
            .into_iter()
            .map(|title| {
                let status = self.status_title(&title);
                (title, status)
            })
            .collect())
    }

    /// Pull every targeted title into the vault
    #[instrument(skip(self))]
    pub fn pull(&self, target: &str) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for title in self.targets(target)? {
            let outcome = self.pull_title(&title);
            if let Err(e) = &outcome {
                self.emit(
                    Event::error("pull_error")
                        .field("title", title.as_str())
                        .field("device", self.device_id.as_str())
                        .field("error", e.to_string()),
                );
            }
            report.add(TitleReport { title, outcome });
        }
        info!("Pull finished: {:?}", report.summary);
        Ok(report)
    }

    /// Push every targeted title from the vault
    #[instrument(skip(self))]
    pub fn push(&self, target: &str, force: bool) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for title in self.targets(target)? {
            let outcome = self.push_title(&title, force);
            if let Err(e) = &outcome {
                self.emit(
                    Event::error("push_error")
                        .field("title", title.as_str())
                        .field("device", self.device_id.as_str())
                        .field("error", e.to_string()),
                );
            }
            report.add(TitleReport { title, outcome });
        }
        info!("Push finished: {:?}", report.summary);
        Ok(report)
    }

    /// Pull one title, resolving a conflict interactively
    pub fn pull_title(&self, title: &str) -> Result<TitleOutcome> {
        let (local_path, vault_path) = self.resolve_paths(title)?;
        let transfer = self.orchestrator.pull(title, &local_path, &vault_path)?;
        let comparison = transfer.comparison.clone();

        let (action, backup) = match comparison.recommendation {
            Recommendation::Pull => {
                self.record_transfer(title, Direction::Pull, &transfer, &comparison.reason);
                (TitleAction::Copied, transfer.backup)
            }
            Recommendation::Conflict => {
                let choice = self.resolver.resolve(&comparison, title, Direction::Pull)?;
                debug!("Conflict on {} resolved as {}", title, choice);
                match choice {
                    ConflictChoice::Local => {
                        let forced = self.orchestrator.force_pull(title, &local_path, &vault_path)?;
                        self.record_transfer(
                            title,
                            Direction::Pull,
                            &forced,
                            "user resolved conflict - chose local",
                        );
                        (TitleAction::ResolvedLocal, forced.backup)
                    }
                    ConflictChoice::Remote => {
                        self.emit(self.title_event(Event::info("pull_skip"), title).field(
                            "reason",
                            "user resolved conflict - chose remote",
                        ));
                        (TitleAction::ResolvedRemote, None)
                    }
                    ConflictChoice::Cancel => {
                        self.emit(self.title_event(Event::info("pull_cancel"), title).field(
                            "reason",
                            "user cancelled conflict resolution",
                        ));
                        return Ok(TitleOutcome {
                            local_path,
                            vault_path,
                            comparison,
                            action: TitleAction::Cancelled,
                            backup: None,
                            archives: Vec::new(),
                        });
                    }
                }
            }
            Recommendation::Skip | Recommendation::Push => {
                self.emit(
                    self.title_event(Event::info("pull_skip"), title)
                        .field("recommendation", comparison.recommendation.to_string())
                        .field("reason", comparison.reason.as_str()),
                );
                (TitleAction::Skipped, None)
            }
        };

        if matches!(action, TitleAction::Copied | TitleAction::ResolvedLocal) {
            self.trim_history(title);
        }

        let archives = self.archive_artifacts(title, &local_path);

        Ok(TitleOutcome {
            local_path,
            vault_path,
            comparison,
            action,
            backup,
            archives,
        })
    }

    /// Push one title
    pub fn push_title(&self, title: &str, force: bool) -> Result<TitleOutcome> {
        let (local_path, vault_path) = self.resolve_paths(title)?;
        let transfer = self.orchestrator.push(title, &vault_path, &local_path, force)?;
        let comparison = transfer.comparison.clone();

        let action = if transfer.copied {
            self.record_transfer(title, Direction::Push, &transfer, &comparison.reason);
            self.trim_history(title);
            TitleAction::Copied
        } else {
            self.emit(
                self.title_event(Event::info("push_skip"), title)
                    .field("reason", comparison.reason.as_str()),
            );
            TitleAction::Skipped
        };

        Ok(TitleOutcome {
            local_path,
            vault_path,
            comparison,
            action,
            backup: transfer.backup,
            archives: Vec::new(),
        })
    }

    /// Restore a named backup over the title's vault copy
    pub fn restore(&self, title: &str, backup_name: &str) -> Result<PathBuf> {
        validate_title_code(title)?;
        let vault_path = self.layout.main_file(title, save_file_name(title));
        let safety_copy = self.backups().restore_backup(title, backup_name, &vault_path)?;

        let mut event = self
            .title_event(Event::info("backup_restored"), title)
            .field("backup", backup_name)
            .path("target", &vault_path);
        if let Some(copy) = &safety_copy {
            event = event.path("pre_restore_backup", copy);
        }
        self.emit(event);
        Ok(vault_path)
    }

    fn record_transfer(&self, title: &str, direction: Direction, transfer: &TransferOutcome, reason: &str) {
        if let Some(backup) = &transfer.backup {
            self.emit(
                self.title_event(Event::info("backup_created"), title)
                    .path("path", backup),
            );
        }

        let (from, to) = match direction {
            Direction::Pull => ("local", "vault"),
            Direction::Push => ("vault", "local"),
        };
        self.emit(
            self.title_event(Event::info(direction.to_string()), title)
                .field("action", "update")
                .field("from", from)
                .field("to", to)
                .field("reason", reason),
        );
    }

    /// Apply the retention limit; a failure is reported, never propagated
    fn trim_history(&self, title: &str) {
        match self.backups().cleanup_old_backups(title, self.config.history_limit) {
            Ok(0) => {}
            Ok(removed) => self.emit(
                self.title_event(Event::info("backup_cleanup"), title)
                    .field("removed", removed)
                    .field("limit", self.config.history_limit),
            ),
            Err(e) => self.emit(
                self.title_event(Event::error("backup_cleanup_error"), title)
                    .field("error", e.to_string()),
            ),
        }
    }

    fn archive_artifacts(&self, title: &str, local_path: &Path) -> Vec<(ArtifactKind, ArchiveReport)> {
        let mut reports = Vec::new();
        for kind in [ArtifactKind::Replay, ArtifactKind::Snapshot] {
            match self.archiver.archive_beside(title, kind, local_path) {
                Ok(report) => reports.push((kind, report)),
                Err(e) => self.emit(
                    Event::error(format!("{}_archive_error", kind))
                        .field("title", title)
                        .field("error", e.to_string()),
                ),
            }
        }
        reports
    }

    fn title_event(&self, event: Event, title: &str) -> Event {
        event
            .field("title", title)
            .field("device", self.device_id.as_str())
    }

    fn emit(&self, event: Event) {
        self.sink.record(event.at(self.clock.now()));
    }
}

/// Builder for [`SyncSession`]
///
/// Unset collaborators default to the real filesystem, the system clock,
/// the `sysinfo`-backed safety oracle, a resolver that cancels every
/// conflict and a sink that forwards to `tracing`.
pub struct SyncSessionBuilder {
    config: SyncConfig,
    device_id: String,
    paths: PathRegistry,
    metadata: Arc<dyn MetadataProvider>,
    oracle: Arc<dyn SafetyOracle>,
    resolver: Arc<dyn ConflictResolver>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl SyncSessionBuilder {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            device_id: String::new(),
            paths: PathRegistry::default(),
            metadata: Arc::new(FsMetadataProvider),
            oracle: Arc::new(SystemSafetyOracle),
            resolver: Arc::new(ScriptedResolver::default()),
            sink: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = id.into();
        self
    }

    pub fn paths(mut self, paths: PathRegistry) -> Self {
        self.paths = paths;
        self
    }

    pub fn metadata(mut self, metadata: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn safety_oracle(mut self, oracle: Arc<dyn SafetyOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> SyncSession {
        let layout = self.config.layout();
        let backups = BackupStore::new(layout.clone(), self.clock.clone());
        SyncSession {
            orchestrator: Orchestrator::new(self.metadata, backups, self.oracle),
            archiver: Archiver::new(layout.clone(), self.sink.clone(), self.clock.clone()),
            layout,
            config: self.config,
            device_id: self.device_id,
            paths: self.paths,
            resolver: self.resolver,
            sink: self.sink,
            clock: self.clock,
        }
    }
}

/// Register save paths for this device
///
/// Adds each `(title, path)` pair to `paths.json`, refreshes this device's
/// entry in `devices.json` and saves both. Returns how many paths were new.
pub fn register_paths<'a>(
    store: &ConfigStore,
    device: &DeviceIdentity,
    entries: impl IntoIterator<Item = (&'a str, &'a Path)>,
    clock: &dyn Clock,
) -> Result<usize> {
    let mut devices = store.load_devices()?;
    let mut paths = store.load_paths()?;

    let mut added = 0;
    for (title, path) in entries {
        validate_title_code(title)?;
        if paths.register(title, &device.id, &path.to_string_lossy()) {
            added += 1;
        }
    }

    devices.upsert(device.to_device(clock.now()));
    store.save_devices(&devices)?;
    store.save_paths(&paths)?;

    info!("Registered {} new path(s) for device {}", added, device.id);
    Ok(added)
}

/// Register detected candidates for this device
pub fn register_candidates(
    store: &ConfigStore,
    device: &DeviceIdentity,
    candidates: &[&DetectCandidate],
    clock: &dyn Clock,
) -> Result<usize> {
    register_paths(
        store,
        device,
        candidates.iter().map(|c| (c.title.code, c.path.as_path())),
        clock,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::events::MemorySink;
    use crate::safety::StaticSafetyOracle;
    use crate::titles::{detect, SearchRoots};
    use chrono::{Duration, TimeZone, Utc};
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use tempfile::TempDir;

    const DEVICE: &str = "0123456789ab";

    fn write_at(path: &Path, content: &[u8], unix: i64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        set_file_mtime(path, FileTime::from_unix_time(unix, 0)).unwrap();
    }

    fn session(root: &Path, paths: PathRegistry, sink: &MemorySink, choices: Vec<ConflictChoice>) -> SyncSession {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap());
        let config = SyncConfig::builder()
            .vault_root(root.join("vault"))
            .history_limit(2)
            .build()
            .unwrap();
        SyncSession::builder(config)
            .device_id(DEVICE)
            .paths(paths)
            .safety_oracle(Arc::new(StaticSafetyOracle::always_safe()))
            .resolver(Arc::new(ScriptedResolver::new(choices)))
            .sink(Arc::new(sink.clone()))
            .clock(Arc::new(clock))
            .build()
    }

    #[test]
    fn test_targets() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = PathRegistry::default();
        paths.register("th10", DEVICE, "/a");
        paths.register("th06", DEVICE, "/b");
        let s = session(temp_dir.path(), paths, &MemorySink::new(), vec![]);

        assert_eq!(s.targets("all").unwrap(), vec!["th06", "th10"]);
        assert_eq!(s.targets("th08").unwrap(), vec!["th08"]);
        assert!(matches!(s.targets("bogus"), Err(SyncError::InvalidTitle(_))));
    }

    #[test]
    fn test_pull_batch_continues_past_errors() {
        let temp_dir = TempDir::new().unwrap();
        let th08 = temp_dir.path().join("games/th08/score.dat");
        write_at(&th08, b"th08 save", 1_700_000_000);

        let mut paths = PathRegistry::default();
        paths.register("th08", DEVICE, &th08.to_string_lossy());
        paths.register("th07", "another-device", "/elsewhere/score.dat");

        let sink = MemorySink::new();
        let s = session(temp_dir.path(), paths, &sink, vec![]);
        let report = s.pull("all").unwrap();

        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.titles[0].title, "th07");
        assert!(matches!(report.titles[0].outcome, Err(SyncError::NoPathConfigured { .. })));
        assert_eq!(sink.find("pull_error").len(), 1);
        assert_eq!(sink.find("pull").len(), 1);
        assert_eq!(
            fs::read(temp_dir.path().join("vault/th08/main/score.dat")).unwrap(),
            b"th08 save"
        );
    }

    #[test]
    fn test_pull_conflict_choices() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = PathRegistry::default();
        for code in ["th06", "th07", "th08"] {
            let local = temp_dir.path().join(format!("games/{}/score.dat", code));
            write_at(&local, b"local is larger", 1_700_000_000);
            write_at(
                &temp_dir.path().join(format!("vault/{}/main/score.dat", code)),
                b"vault newer",
                1_700_000_600,
            );
            paths.register(code, DEVICE, &local.to_string_lossy());
        }

        let sink = MemorySink::new();
        let s = session(
            temp_dir.path(),
            paths,
            &sink,
            vec![ConflictChoice::Local, ConflictChoice::Remote, ConflictChoice::Cancel],
        );
        let report = s.pull("all").unwrap();

        assert_eq!(
            report.summary,
            BatchSummary {
                succeeded: 1,
                skipped: 1,
                conflicts: 3,
                cancelled: 1,
                failed: 0
            }
        );
        let vault = |code: &str| fs::read(temp_dir.path().join(format!("vault/{}/main/score.dat", code))).unwrap();
        assert_eq!(vault("th06"), b"local is larger");
        assert_eq!(vault("th07"), b"vault newer");
        assert_eq!(vault("th08"), b"vault newer");
        assert_eq!(sink.find("pull_cancel").len(), 1);
        assert_eq!(s.backups().list_backups("th06").unwrap().len(), 1);
    }

    #[test]
    fn test_pull_archives_and_trims_history() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("games/th08/score.dat");
        write_at(&temp_dir.path().join("games/th08/replay/th8_01.rpy"), b"replay", 1_700_000_000);

        let mut paths = PathRegistry::default();
        paths.register("th08", DEVICE, &local.to_string_lossy());
        let sink = MemorySink::new();
        let s = session(temp_dir.path(), paths, &sink, vec![]);

        // Copies into the vault carry the current time, so local saves are
        // stamped ahead of it.
        let base = Utc::now().timestamp() + 3600;
        for i in 0..4i64 {
            write_at(&local, format!("save v{}", i).as_bytes(), base + i * 600);
            let outcome = s.pull_title("th08").unwrap();
            assert_eq!(outcome.action, TitleAction::Copied);
        }

        assert_eq!(s.backups().list_backups("th08").unwrap().len(), 2);
        assert!(!sink.find("backup_cleanup").is_empty());
        let complete = sink.find("replay_archive_complete");
        assert_eq!(complete.len(), 4);
        assert_eq!(complete[0].fields["archived"], 1);
        assert_eq!(complete[3].fields["archived"], 0);
        assert_eq!(sink.find("snapshot_dir_not_found").len(), 4);
    }

    #[test]
    fn test_archive_error_does_not_fail_pull() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("games/th08/score.dat");
        write_at(&local, b"th08 save", 1_700_000_000);
        write_at(&temp_dir.path().join("games/th08/replay/th8_01.rpy"), b"replay", 1_700_000_000);
        write_at(&temp_dir.path().join("vault/th08/replay"), b"blocks the archive", 1_700_000_000);

        let mut paths = PathRegistry::default();
        paths.register("th08", DEVICE, &local.to_string_lossy());
        let sink = MemorySink::new();
        let s = session(temp_dir.path(), paths, &sink, vec![]);

        let report = s.pull("th08").unwrap();
        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(report.summary.failed, 0);
        assert_eq!(sink.messages(), vec!["pull", "replay_archive_error", "snapshot_dir_not_found"]);
        assert_eq!(
            fs::read(temp_dir.path().join("vault/th08/main/score.dat")).unwrap(),
            b"th08 save"
        );
    }

    #[test]
    fn test_failed_backup_leaves_vault_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("games/th08/score.dat");
        let vault = temp_dir.path().join("vault/th08/main/score.dat");
        write_at(&vault, b"old vault save", 1_700_000_000);
        write_at(&local, b"newer local save", 1_700_000_600);
        fs::write(temp_dir.path().join("vault/th08/_history"), b"not a directory").unwrap();

        let mut paths = PathRegistry::default();
        paths.register("th08", DEVICE, &local.to_string_lossy());
        let sink = MemorySink::new();
        let s = session(temp_dir.path(), paths, &sink, vec![]);

        match s.pull_title("th08") {
            Err(SyncError::TransferFailed { comparison, source }) => {
                assert_eq!(comparison.recommendation, Recommendation::Pull);
                assert!(matches!(*source, SyncError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));
            }
            other => panic!("expected TransferFailed, got {:?}", other),
        }
        assert_eq!(fs::read(&vault).unwrap(), b"old vault save");

        let report = s.pull("th08").unwrap();
        assert_eq!(report.summary.failed, 1);
        assert_eq!(sink.find("pull_error").len(), 1);
        assert!(sink.find("pull").is_empty());
    }

    #[test]
    fn test_failed_cleanup_keeps_the_copy() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("games/th08/score.dat");
        write_at(&local, b"th08 save", 1_700_000_000);
        write_at(&temp_dir.path().join("vault/th08/_history"), b"not a directory", 1_700_000_000);

        let mut paths = PathRegistry::default();
        paths.register("th08", DEVICE, &local.to_string_lossy());
        let sink = MemorySink::new();
        let s = session(temp_dir.path(), paths, &sink, vec![]);

        let report = s.pull("th08").unwrap();
        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(report.summary.failed, 0);
        let outcome = report.titles[0].outcome.as_ref().unwrap();
        assert_eq!(outcome.action, TitleAction::Copied);

        let cleanup = sink.find("backup_cleanup_error");
        assert_eq!(cleanup.len(), 1);
        assert_eq!(cleanup[0].str_field("title"), Some("th08"));
        assert!(sink.find("pull_error").is_empty());
        assert_eq!(sink.find("snapshot_dir_not_found").len(), 1);
        assert_eq!(
            fs::read(temp_dir.path().join("vault/th08/main/score.dat")).unwrap(),
            b"th08 save"
        );
    }

    #[test]
    fn test_push_refusal_is_counted() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("games/th10/scoreth10.dat");
        write_at(&local, b"local newer", 1_700_000_600);
        write_at(&temp_dir.path().join("vault/th10/main/scoreth10.dat"), b"vault older", 1_700_000_000);

        let mut paths = PathRegistry::default();
        paths.register("th10", DEVICE, &local.to_string_lossy());
        let sink = MemorySink::new();
        let s = session(temp_dir.path(), paths, &sink, vec![]);

        let report = s.push("th10", false).unwrap();
        assert_eq!(report.summary.failed, 1);
        assert_eq!(sink.find("push_error").len(), 1);
        assert_eq!(fs::read(&local).unwrap(), b"local newer");

        let report = s.push("th10", true).unwrap();
        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(fs::read(&local).unwrap(), b"vault older");
        assert_eq!(sink.find("push")[0].str_field("from"), Some("vault"));
    }

    #[test]
    fn test_restore_emits_event() {
        let temp_dir = TempDir::new().unwrap();
        let sink = MemorySink::new();
        let s = session(temp_dir.path(), PathRegistry::default(), &sink, vec![]);

        let vault = temp_dir.path().join("vault/th08/main/score.dat");
        write_at(&vault, b"v1", 1_700_000_000);
        let backup = s.backups().create_backup("th08", &vault).unwrap();
        fs::write(&vault, b"v2").unwrap();

        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        s.restore("th08", &name).unwrap();

        assert_eq!(fs::read(&vault).unwrap(), b"v1");
        assert_eq!(s.backups().list_backups("th08").unwrap().len(), 2);
        assert_eq!(sink.find("backup_restored").len(), 1);
    }

    #[test]
    fn test_register_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let game_dir = temp_dir.path().join("game");
        write_at(&game_dir.join("th10/scoreth10.dat"), b"10", 1_700_000_000);

        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap());
        let store = ConfigStore::new(temp_dir.path().join("data"), Arc::new(clock.clone()));
        let device = DeviceIdentity::from_parts("desk", "aa:bb:cc:dd:ee:ff");

        let report = detect(&SearchRoots::default(), Some(&game_dir), &FsMetadataProvider).unwrap();
        let selected: Vec<&DetectCandidate> = report.candidates.iter().collect();
        assert_eq!(register_candidates(&store, &device, &selected, &clock).unwrap(), 1);

        clock.advance(Duration::hours(1));
        assert_eq!(register_candidates(&store, &device, &selected, &clock).unwrap(), 0);

        let manual = temp_dir.path().join("elsewhere/score.dat");
        assert_eq!(
            register_paths(&store, &device, [("th06", manual.as_path())], &clock).unwrap(),
            1
        );
        assert!(register_paths(&store, &device, [("bogus", manual.as_path())], &clock).is_err());

        let paths = store.load_paths().unwrap();
        assert_eq!(paths.preferred_path("th06", &device.id).unwrap(), manual);
        assert_eq!(
            paths.preferred_path("th10", &device.id).unwrap(),
            game_dir.join("th10/scoreth10.dat")
        );
        let devices = store.load_devices().unwrap();
        assert_eq!(devices.devices.len(), 1);
        assert_eq!(devices.devices[0].last_seen, clock.now());
    }
}
