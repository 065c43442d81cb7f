//! Three-point file comparison
//!
//! [`compare`] decides which of two copies of the same logical file is
//! authoritative. It is pure: it reads only the two metadata snapshots it is
//! given and never touches the filesystem.
//!
//! ## Decision order
//!
//! 1. Existence. Both absent is `SKIP`, a missing local is `PUSH`, a missing
//!    vault copy is `PULL`.
//! 2. Readability. Either side unreadable is `SKIP`.
//! 3. Content hash. Equal hashes are `SKIP` no matter what size or time say.
//! 4. Evidence. Size and modification time each produce a [`Preference`].
//!    A size ratio above [`MAX_SIZE_RATIO`] is a `CONFLICT` on its own.
//!    Times within [`DRIFT_TOLERANCE_SECS`] are treated as equal. The two
//!    preferences are then combined; when they point at opposite sides the
//!    verdict is `CONFLICT`.
//!
//! ## Example
//!
//! ```rust
//! use savesync::comparator::compare;
//! use savesync::types::{FileMetadata, Recommendation};
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let t = Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap();
//! let local = FileMetadata::present("/saves/score.dat", 2000, t + Duration::minutes(10), "aa");
//! let remote = FileMetadata::present("/vault/th08/main/score.dat", 1000, t, "bb");
//!
//! let result = compare(&local, &remote);
//! assert_eq!(result.recommendation, Recommendation::Pull);
//! ```

use crate::types::{ComparisonResult, FileMetadata, Preference, Recommendation};
use chrono::{DateTime, Utc};

/// Largest time difference, in seconds, still treated as "same time"
pub const DRIFT_TOLERANCE_SECS: i64 = 3;

/// Size ratio above which a size difference is escalated to a conflict
pub const MAX_SIZE_RATIO: f64 = 2.0;

/// Ratio used when the smaller side is empty
const EMPTY_SIDE_RATIO: f64 = 999.0;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Compare a local file against its vault counterpart
///
/// Total over every combination of existence and readability.
pub fn compare(local: &FileMetadata, remote: &FileMetadata) -> ComparisonResult {
    let verdict = |recommendation, reason: String| ComparisonResult {
        local: local.clone(),
        remote: remote.clone(),
        hash_match: false,
        size_diff: 0,
        time_diff: 0,
        recommendation,
        reason,
    };

    match (local.exists, remote.exists) {
        (false, false) => return verdict(Recommendation::Skip, "both files do not exist".into()),
        (false, true) => return verdict(Recommendation::Push, "local file does not exist".into()),
        (true, false) => return verdict(Recommendation::Pull, "remote file does not exist".into()),
        (true, true) => {}
    }

    if !local.readable {
        return verdict(Recommendation::Skip, "local file not readable".into());
    }
    if !remote.readable {
        return verdict(Recommendation::Skip, "remote file not readable".into());
    }

    let size_diff = local.size as i64 - remote.size as i64;
    let time_diff = time_diff_secs(&local.modified, &remote.modified);
    let result = |recommendation, reason: String| ComparisonResult {
        size_diff,
        time_diff,
        ..verdict(recommendation, reason)
    };

    if local.hash.is_some() && local.hash == remote.hash {
        return ComparisonResult {
            hash_match: true,
            ..result(Recommendation::Skip, "files are identical (hash match)".into())
        };
    }

    let size_pref = match size_diff.cmp(&0) {
        std::cmp::Ordering::Greater => {
            let ratio = size_ratio(local.size, remote.size);
            if ratio > MAX_SIZE_RATIO {
                return result(
                    Recommendation::Conflict,
                    format!(
                        "local file suspiciously large ({:.1}x larger, local={} remote={})",
                        ratio, local.size, remote.size
                    ),
                );
            }
            Preference::Local
        }
        std::cmp::Ordering::Less => {
            let ratio = size_ratio(remote.size, local.size);
            if ratio > MAX_SIZE_RATIO {
                return result(
                    Recommendation::Conflict,
                    format!(
                        "remote file suspiciously large ({:.1}x larger, remote={} local={})",
                        ratio, remote.size, local.size
                    ),
                );
            }
            Preference::Remote
        }
        std::cmp::Ordering::Equal => Preference::Equal,
    };

    let time_pref = if time_diff.abs() <= DRIFT_TOLERANCE_SECS {
        Preference::Equal
    } else if time_diff > 0 {
        Preference::Local
    } else {
        Preference::Remote
    };

    let lt = local.modified.format(TIME_FORMAT);
    let rt = remote.modified.format(TIME_FORMAT);

    match (size_pref, time_pref) {
        (Preference::Equal, Preference::Equal) => result(
            Recommendation::Skip,
            format!(
                "files appear identical (size={}, mtime within {}s drift)",
                local.size, DRIFT_TOLERANCE_SECS
            ),
        ),
        (Preference::Local, Preference::Local) => result(
            Recommendation::Pull,
            format!(
                "local file is both larger and newer (size: local={} remote={}, time: local={} remote={})",
                local.size, remote.size, lt, rt
            ),
        ),
        (Preference::Remote, Preference::Remote) => result(
            Recommendation::Push,
            format!(
                "remote file is both larger and newer (size: remote={} local={}, time: remote={} local={})",
                remote.size, local.size, rt, lt
            ),
        ),
        (Preference::Equal, Preference::Local) => result(
            Recommendation::Pull,
            format!(
                "local file is newer (size equal={}, time: local={} remote={}, diff={}s)",
                local.size, lt, rt, time_diff
            ),
        ),
        (Preference::Equal, Preference::Remote) => result(
            Recommendation::Push,
            format!(
                "remote file is newer (size equal={}, time: remote={} local={}, diff={}s)",
                local.size, rt, lt, -time_diff
            ),
        ),
        (Preference::Local, Preference::Equal) => result(
            Recommendation::Pull,
            format!(
                "local file is larger (size: local={} remote={}, time within drift)",
                local.size, remote.size
            ),
        ),
        (Preference::Remote, Preference::Equal) => result(
            Recommendation::Push,
            format!(
                "remote file is larger (size: remote={} local={}, time within drift)",
                remote.size, local.size
            ),
        ),
        (Preference::Local, Preference::Remote) => result(
            Recommendation::Conflict,
            format!(
                "evidence conflict: local is larger ({} vs {}) but remote is newer ({} vs {})",
                local.size, remote.size, rt, lt
            ),
        ),
        (Preference::Remote, Preference::Local) => result(
            Recommendation::Conflict,
            format!(
                "evidence conflict: remote is larger ({} vs {}) but local is newer ({} vs {})",
                remote.size, local.size, lt, rt
            ),
        ),
    }
}

/// `a - b` in whole seconds
pub fn time_diff_secs(a: &DateTime<Utc>, b: &DateTime<Utc>) -> i64 {
    a.timestamp() - b.timestamp()
}

fn size_ratio(larger: u64, smaller: u64) -> f64 {
    if smaller == 0 {
        EMPTY_SIDE_RATIO
    } else {
        larger as f64 / smaller as f64
    }
}
