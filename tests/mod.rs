//! Main test module for savesync
//!
//! This module includes all test suites:
//! - Integration tests for multi-machine pull/push/restore flows
//! - Property-based tests for the comparator and history trimming

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::savesync::clock::FixedClock;
    use ::savesync::config::{ConfigStore, DEVICES_FILE, PATHS_FILE};
    use ::savesync::device::DeviceIdentity;
    use ::savesync::session::register_paths;
    use ::savesync::*;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_register_leaves_corrupt_paths_alone() {
        let temp_dir = TempDir::new().unwrap();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 12, 1, 8, 30, 0).unwrap());
        let store = ConfigStore::new(temp_dir.path(), Arc::new(clock.clone()));
        let device = DeviceIdentity::from_parts("desk", "aa:bb:cc:dd:ee:ff");

        fs::write(temp_dir.path().join(PATHS_FILE), "{ not json").unwrap();
        let local = temp_dir.path().join("th08/score.dat");
        let result = register_paths(&store, &device, [("th08", local.as_path())], &clock);

        match result {
            Err(SyncError::ConfigCorrupt { preserved_at: Some(saved), .. }) => {
                assert_eq!(
                    saved.file_name().unwrap().to_string_lossy(),
                    "paths.json.backup-20251201-083000"
                );
            }
            other => panic!("expected ConfigCorrupt, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(temp_dir.path().join(PATHS_FILE)).unwrap(), "{ not json");
        assert!(!temp_dir.path().join(DEVICES_FILE).exists());
    }

    #[test]
    fn test_rules_history_limit_roundtrip() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = ConfigStore::new(temp_dir.path().join("data"), Arc::new(SystemClock));
        assert_eq!(store.load_rules()?, Rules::default());

        let rules = Rules {
            history_limit: 5,
            ..Rules::default()
        };
        store.save_rules(&rules)?;

        let loaded = store.load_rules()?;
        let config = SyncConfig::builder()
            .vault_root(temp_dir.path().join("vault"))
            .history_limit(loaded.history_limit)
            .build()?;
        assert_eq!(config.history_limit, 5);
        Ok(())
    }

    #[test]
    fn test_unicode_local_path() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("東方永夜抄").join("score.dat");
        if fs::create_dir_all(local.parent().unwrap()).is_err() {
            return;
        }
        fs::write(&local, b"unicode").unwrap();

        let mut paths = PathRegistry::default();
        paths.register("th08", "dev", &local.to_string_lossy());

        let config = SyncConfig::builder()
            .vault_root(temp_dir.path().join("vault"))
            .build()
            .unwrap();
        let session = SyncSession::builder(config)
            .device_id("dev")
            .paths(paths)
            .sink(Arc::new(::savesync::events::MemorySink::new()))
            .build();

        let report = session.pull("th08").unwrap();
        assert_eq!(report.summary.succeeded, 1);
        assert_eq!(
            fs::read(temp_dir.path().join("vault/th08/main/score.dat")).unwrap(),
            b"unicode"
        );
    }
}
