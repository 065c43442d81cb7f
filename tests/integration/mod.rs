//! End-to-end flows across machines, the vault and its history
//!
//! Each test builds a throwaway vault plus one or more "machines" (local
//! directories registered under their own device id) and drives them
//! through [`SyncSession`] with a scripted conflict resolver.

use ::savesync::clock::FixedClock;
use ::savesync::conflict::ScriptedResolver;
use ::savesync::events::{JsonLinesSink, MemorySink};
use ::savesync::safety::StaticSafetyOracle;
use ::savesync::session::TitleAction;
use ::savesync::*;
use chrono::{Duration, TimeZone, Utc};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A vault shared by several machines
pub struct VaultHarness {
    pub temp_dir: TempDir,
    pub clock: FixedClock,
    pub sink: MemorySink,
    pub paths: PathRegistry,
    pub history_limit: usize,
}

impl VaultHarness {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
            clock: FixedClock::new(Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap()),
            sink: MemorySink::new(),
            paths: PathRegistry::default(),
            history_limit: 20,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn vault_file(&self, title: &str, file: &str) -> PathBuf {
        self.root().join("vault").join(title).join("main").join(file)
    }

    /// Register `<root>/<device>/<title>/<file>` as the save of `title` on `device`
    pub fn machine_save(&mut self, device: &str, title: &str, file: &str) -> PathBuf {
        let path = self.root().join(device).join(title).join(file);
        self.paths.register(title, device, &path.to_string_lossy());
        path
    }

    pub fn session(&self, device: &str, oracle: StaticSafetyOracle, resolver: Arc<ScriptedResolver>) -> SyncSession {
        let config = SyncConfig::builder()
            .vault_root(self.root().join("vault"))
            .history_limit(self.history_limit)
            .build()
            .unwrap();
        SyncSession::builder(config)
            .device_id(device)
            .paths(self.paths.clone())
            .safety_oracle(Arc::new(oracle))
            .resolver(resolver)
            .sink(Arc::new(self.sink.clone()))
            .clock(Arc::new(self.clock.clone()))
            .build()
    }

    pub fn safe_session(&self, device: &str) -> SyncSession {
        self.session(
            device,
            StaticSafetyOracle::always_safe(),
            Arc::new(ScriptedResolver::default()),
        )
    }
}

/// Write `content` and stamp it `offset` seconds away from the wall clock
///
/// Copies made by a pull or push carry the current time, so relative
/// stamps keep comparisons against them meaningful.
pub fn write_save(path: &Path, content: &[u8], offset: i64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
    let unix = Utc::now().timestamp() + offset;
    set_file_mtime(path, FileTime::from_unix_time(unix, 0)).unwrap();
}

#[test]
fn test_two_machine_round_trip() {
    let mut h = VaultHarness::new();
    let desk = h.machine_save("desk", "th08", "score.dat");
    let laptop = h.machine_save("laptop", "th08", "score.dat");

    write_save(&desk, b"desk progress, much further", 3600);
    write_save(&laptop, b"laptop old save", -86_400);

    let report = h.safe_session("desk").pull("th08").unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(fs::read(h.vault_file("th08", "score.dat")).unwrap(), b"desk progress, much further");

    h.clock.advance(Duration::minutes(5));
    let laptop_session = h.safe_session("laptop");
    let report = laptop_session.push("th08", false).unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(fs::read(&laptop).unwrap(), b"desk progress, much further");

    let backups = laptop_session.backups().backup_details("th08").unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read(&backups[0].path).unwrap(), b"laptop old save");

    let status = laptop_session.status_title("th08").unwrap();
    assert_eq!(status.comparison.recommendation, Recommendation::Skip);
    assert!(status.comparison.hash_match);

    let push = h.sink.find("push");
    assert_eq!(push.len(), 1);
    assert_eq!(push[0].str_field("device"), Some("laptop"));
    assert_eq!(push[0].str_field("action"), Some("update"));
}

#[test]
fn test_push_blocked_while_game_running() {
    let mut h = VaultHarness::new();
    let local = h.machine_save("desk", "th10", "scoreth10.dat");
    write_save(&local, b"old save data", -86_400);
    write_save(&h.vault_file("th10", "scoreth10.dat"), b"newer and larger", 0);

    let running = || StaticSafetyOracle::always_unsafe("process_running:th10.exe");
    let session = h.session("desk", running(), Arc::new(ScriptedResolver::default()));

    let report = session.push("th10", false).unwrap();
    assert_eq!(report.summary.failed, 1);
    match &report.titles[0].outcome {
        Err(SyncError::UnsafeToWrite { reason, .. }) => assert_eq!(reason, "process_running:th10.exe"),
        other => panic!("expected UnsafeToWrite, got {:?}", other),
    }
    assert_eq!(fs::read(&local).unwrap(), b"old save data");
    assert!(session.backups().list_backups("th10").unwrap().is_empty());

    let report = session.push("th10", true).unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(fs::read(&local).unwrap(), b"newer and larger");
}

#[test]
fn test_pull_conflict_resolved_locally() {
    let mut h = VaultHarness::new();
    let local = h.machine_save("desk", "th08", "score.dat");
    // Larger but older than the vault copy.
    write_save(&local, b"larger local save", -3600);
    write_save(&h.vault_file("th08", "score.dat"), b"vault save", 0);

    let resolver = Arc::new(ScriptedResolver::new([ConflictChoice::Local]));
    let session = h.session("desk", StaticSafetyOracle::always_safe(), resolver.clone());

    let outcome = session.pull_title("th08").unwrap();
    assert_eq!(outcome.action, TitleAction::ResolvedLocal);
    assert!(outcome.comparison.is_conflict());
    assert_eq!(resolver.presented(), vec!["th08".to_string()]);

    assert_eq!(fs::read(h.vault_file("th08", "score.dat")).unwrap(), b"larger local save");
    let backup = outcome.backup.unwrap();
    assert_eq!(fs::read(backup).unwrap(), b"vault save");

    let pull = h.sink.find("pull");
    assert_eq!(pull[0].str_field("reason"), Some("user resolved conflict - chose local"));
}

#[test]
fn test_suspicious_size_is_never_copied_automatically() {
    let mut h = VaultHarness::new();
    let local = h.machine_save("desk", "th08", "score.dat");
    write_save(&local, &[0u8; 4096], 3600);
    write_save(&h.vault_file("th08", "score.dat"), &[1u8; 1024], 0);

    let session = h.safe_session("desk");
    let report = session.pull("th08").unwrap();

    assert_eq!(report.summary.conflicts, 1);
    assert_eq!(report.summary.cancelled, 1);
    assert_eq!(fs::read(h.vault_file("th08", "score.dat")).unwrap(), vec![1u8; 1024]);
    assert_eq!(h.sink.find("pull_cancel").len(), 1);

    let report = session.push("th08", false).unwrap();
    assert!(matches!(report.titles[0].outcome, Err(SyncError::Conflict { .. })));
    assert_eq!(report.summary.conflicts, 1);
    assert_eq!(fs::read(&local).unwrap(), vec![0u8; 4096]);
}

#[test]
fn test_restore_after_bad_pull() {
    let mut h = VaultHarness::new();
    let local = h.machine_save("desk", "th07", "score.dat");
    let session = h.safe_session("desk");

    write_save(&local, b"good run", 3600);
    session.pull("th07").unwrap();

    h.clock.advance(Duration::minutes(10));
    write_save(&local, b"bad data", 7200);
    session.pull("th07").unwrap();
    assert_eq!(fs::read(h.vault_file("th07", "score.dat")).unwrap(), b"bad data");

    let details = session.backups().backup_details("th07").unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].timestamp, Some(Utc.with_ymd_and_hms(2025, 12, 1, 12, 10, 0).unwrap()));

    h.clock.advance(Duration::minutes(1));
    let target = session.restore("th07", &details[0].name).unwrap();
    assert_eq!(target, h.vault_file("th07", "score.dat"));
    assert_eq!(fs::read(&target).unwrap(), b"good run");

    // The overwritten "bad data" copy is itself kept, newest first.
    let details = session.backups().backup_details("th07").unwrap();
    assert_eq!(details.len(), 2);
    assert_eq!(fs::read(&details[0].path).unwrap(), b"bad data");

    assert!(matches!(
        session.restore("th07", "../main/score.dat"),
        Err(SyncError::BackupNotFound { .. })
    ));
}

#[test]
fn test_history_is_trimmed_to_limit() {
    let mut h = VaultHarness::new();
    h.history_limit = 3;
    let local = h.machine_save("desk", "th09", "score.dat");
    let session = h.safe_session("desk");

    for i in 0..6i64 {
        write_save(&local, format!("run {}", i).as_bytes(), 3600 + i * 60);
        session.pull("th09").unwrap();
        h.clock.advance(Duration::minutes(1));
    }

    let names = session.backups().list_backups("th09").unwrap();
    assert_eq!(names.len(), 3);
    let newest = &session.backups().backup_details("th09").unwrap()[0];
    assert_eq!(fs::read(&newest.path).unwrap(), b"run 4");
}

#[test]
fn test_replays_archived_once_per_content() {
    let mut h = VaultHarness::new();
    let local = h.machine_save("desk", "th08", "score.dat");
    let replays = local.parent().unwrap().join("replay");
    write_save(&local, b"save", 3600);
    write_save(&replays.join("th8_01.rpy"), b"replay one", -60);
    write_save(&replays.join("th8_ud0001.rpy"), b"replay one", -30);

    let session = h.safe_session("desk");
    let outcome = session.pull_title("th08").unwrap();
    let (_, replay_report) = outcome.archives.iter().find(|(k, _)| *k == ArtifactKind::Replay).unwrap();
    assert_eq!(replay_report.archived, 1);
    assert_eq!(replay_report.skipped, 1);

    write_save(&replays.join("th8_02.rpy"), b"replay two", 0);
    let outcome = session.pull_title("th08").unwrap();
    assert_eq!(outcome.action, TitleAction::Skipped);
    let (_, replay_report) = outcome.archives.iter().find(|(k, _)| *k == ArtifactKind::Replay).unwrap();
    assert_eq!(replay_report.archived, 1);
    assert_eq!(replay_report.skipped, 2);

    let archive_dir = h.root().join("vault/th08/replay");
    let mut names: Vec<String> = fs::read_dir(&archive_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.ends_with("_th8_02.rpy")));
}

#[test]
fn test_batch_writes_json_lines_log() {
    let mut h = VaultHarness::new();
    let th06 = h.machine_save("desk", "th06", "score.dat");
    write_save(&th06, b"th06", 3600);
    h.paths.register("th07", "other-machine", "/nowhere/score.dat");

    let log_root = h.root().join("logs");
    let sink = JsonLinesSink::new(&log_root, Arc::new(h.clock.clone())).unwrap();
    let log_file = sink.current_file();
    let op_id = sink.op_id().to_string();

    let config = SyncConfig::builder()
        .vault_root(h.root().join("vault"))
        .build()
        .unwrap();
    let session = SyncSession::builder(config)
        .device_id("desk")
        .paths(h.paths.clone())
        .safety_oracle(Arc::new(StaticSafetyOracle::always_safe()))
        .sink(Arc::new(sink))
        .clock(Arc::new(h.clock.clone()))
        .build();

    let report = session.pull("all").unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.failed, 1);

    assert_eq!(log_file, log_root.join("2025-12-01.log"));
    let lines: Vec<serde_json::Value> = fs::read_to_string(&log_file)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert!(lines.iter().all(|l| l["op_id"] == op_id.as_str()));
    let pull = lines.iter().find(|l| l["msg"] == "pull").unwrap();
    assert_eq!(pull["title"], "th06");
    assert_eq!(pull["from"], "local");
    assert_eq!(pull["level"], "INFO");
    let error = lines.iter().find(|l| l["msg"] == "pull_error").unwrap();
    assert_eq!(error["title"], "th07");
    assert_eq!(error["level"], "ERROR");
}
