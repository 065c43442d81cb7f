//! Property-based testing for savesync
//!
//! Uses proptest to check the comparator's invariants over arbitrary
//! combinations of existence, readability, size, time and content, and the
//! history store's trimming over arbitrary backup counts.

use ::savesync::clock::FixedClock;
use ::savesync::comparator::{compare, DRIFT_TOLERANCE_SECS, MAX_SIZE_RATIO};
use ::savesync::*;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

/// Metadata for any state a file can be in
fn metadata_strategy(path: &'static str) -> impl Strategy<Value = FileMetadata> {
    let present = (0u64..10_000, -100_000i64..100_000, "[0-9a-f]{4}").prop_map(move |(size, offset, hash)| {
        FileMetadata::present(path, size, base_time() + Duration::seconds(offset), hash)
    });
    let unreadable = (0u64..10_000, -100_000i64..100_000)
        .prop_map(move |(size, offset)| FileMetadata::unreadable(path, size, base_time() + Duration::seconds(offset)));

    prop_oneof![
        6 => present,
        1 => unreadable,
        1 => Just(FileMetadata::absent(path)),
    ]
}

fn mirror(r: Recommendation) -> Recommendation {
    match r {
        Recommendation::Pull => Recommendation::Push,
        Recommendation::Push => Recommendation::Pull,
        other => other,
    }
}

proptest! {
    #[test]
    fn prop_compare_is_total(local in metadata_strategy("/local"), remote in metadata_strategy("/vault")) {
        let result = compare(&local, &remote);
        prop_assert!(!result.reason.is_empty());
        prop_assert_eq!(&result.local, &local);
        prop_assert_eq!(&result.remote, &remote);

        if local.is_usable() && remote.is_usable() {
            prop_assert_eq!(result.size_diff, local.size as i64 - remote.size as i64);
        } else {
            prop_assert_eq!(result.size_diff, 0);
            prop_assert_eq!(result.time_diff, 0);
            prop_assert!(!result.hash_match);
        }
    }

    #[test]
    fn prop_equal_hashes_always_skip(
        local_size in 0u64..10_000,
        remote_size in 0u64..10_000,
        local_offset in -100_000i64..100_000,
        remote_offset in -100_000i64..100_000,
        hash in "[0-9a-f]{64}",
    ) {
        let local = FileMetadata::present("/local", local_size, base_time() + Duration::seconds(local_offset), hash.clone());
        let remote = FileMetadata::present("/vault", remote_size, base_time() + Duration::seconds(remote_offset), hash);

        let result = compare(&local, &remote);
        prop_assert_eq!(result.recommendation, Recommendation::Skip);
        prop_assert!(result.hash_match);
    }

    #[test]
    fn prop_existence_decides_first(present in metadata_strategy("/file")) {
        prop_assume!(present.exists);

        let pushed = compare(&FileMetadata::absent("/local"), &present);
        prop_assert_eq!(pushed.recommendation, Recommendation::Push);

        let pulled = compare(&present, &FileMetadata::absent("/vault"));
        prop_assert_eq!(pulled.recommendation, Recommendation::Pull);
    }

    #[test]
    fn prop_swapping_sides_mirrors_the_verdict(a in metadata_strategy("/a"), b in metadata_strategy("/b")) {
        let forward = compare(&a, &b);
        let backward = compare(&b, &a);
        prop_assert_eq!(forward.recommendation, mirror(backward.recommendation));
    }

    #[test]
    fn prop_drift_within_tolerance_is_not_evidence(
        size in 1u64..10_000,
        offset in -DRIFT_TOLERANCE_SECS..=DRIFT_TOLERANCE_SECS,
    ) {
        let local = FileMetadata::present("/local", size, base_time() + Duration::seconds(offset), "aaaa");
        let remote = FileMetadata::present("/vault", size, base_time(), "bbbb");

        prop_assert_eq!(compare(&local, &remote).recommendation, Recommendation::Skip);
    }

    #[test]
    fn prop_large_size_ratio_is_a_conflict(
        smaller in 1u64..1_000,
        factor in 3u64..50,
        local_larger in any::<bool>(),
        offset in -100_000i64..100_000,
    ) {
        let larger = smaller * factor;
        prop_assume!(larger as f64 / smaller as f64 > MAX_SIZE_RATIO);
        let (local_size, remote_size) = if local_larger { (larger, smaller) } else { (smaller, larger) };

        let local = FileMetadata::present("/local", local_size, base_time() + Duration::seconds(offset), "aaaa");
        let remote = FileMetadata::present("/vault", remote_size, base_time(), "bbbb");

        let result = compare(&local, &remote);
        prop_assert_eq!(result.recommendation, Recommendation::Conflict);
        prop_assert!(result.reason.contains("suspiciously large"));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_cleanup_keeps_newest(count in 0usize..12, limit in 1usize..8) {
        let temp_dir = TempDir::new().unwrap();
        let clock = FixedClock::new(base_time());
        let store = BackupStore::new(VaultLayout::new(temp_dir.path()), Arc::new(clock.clone()));

        let source = temp_dir.path().join("score.dat");
        for i in 0..count {
            fs::write(&source, format!("save {}", i)).unwrap();
            store.create_backup("th08", &source).unwrap();
            clock.advance(Duration::seconds(1));
        }

        let removed = store.cleanup_old_backups("th08", limit).unwrap();
        prop_assert_eq!(removed, count.saturating_sub(limit));

        let details = store.backup_details("th08").unwrap();
        prop_assert_eq!(details.len(), count.min(limit));
        if let Some(newest) = details.first() {
            prop_assert_eq!(fs::read_to_string(&newest.path).unwrap(), format!("save {}", count - 1));
        }
        let stamps: Vec<_> = details.iter().map(|d| d.timestamp).collect();
        let mut sorted = stamps.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        prop_assert_eq!(stamps, sorted);
    }
}
