//! # savesync - Offline save-data synchronization
//!
//! Keeps game save files in step between the machines you play on and a
//! portable vault, usually a directory on a USB stick.
//!
//! ## Overview
//!
//! Each machine holds one save file per title. The vault holds a single
//! authoritative copy per title plus a rolling history. Moving data is
//! always an explicit, directional operation:
//!
//! - **pull** copies a local save into the vault
//! - **push** copies the vault copy over the local save
//! - **status** compares both sides without touching anything
//!
//! Before any overwrite the file about to be replaced is copied into the
//! title's `_history` directory, and every copy goes through a temporary
//! file in the destination directory followed by a rename. A crash at any
//! point leaves the destination either untouched or fully replaced.
//!
//! ## Deciding a direction
//!
//! The [`comparator`] looks at existence, readability, content hash, size
//! and modification time and produces one of four verdicts: `SKIP`, `PULL`,
//! `PUSH` or `CONFLICT`. Size and time are independent pieces of evidence.
//! When they agree the verdict follows them; when they disagree, or one
//! side is more than twice the size of the other, the verdict is
//! `CONFLICT` and a human decides.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use savesync::{ConfigStore, SyncConfig, SyncSession, SystemClock};
//! use savesync::device::DeviceIdentity;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::under("/mnt/usb/savesync".as_ref());
//! let store = ConfigStore::new(&config.config_dir, Arc::new(SystemClock));
//! let device = DeviceIdentity::detect()?;
//!
//! let session = SyncSession::builder(config)
//!     .device_id(device.id)
//!     .paths(store.load_paths()?)
//!     .build();
//!
//! for (title, status) in session.status("all")? {
//!     match status {
//!         Ok(status) => println!("{}: {}", title, status.comparison.recommendation),
//!         Err(e) => println!("{}: {}", title, e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Vault layout
//!
//! ```text
//! <vault>/<title>/main/<save file>      authoritative copy
//! <vault>/<title>/_history/<timestamp>-<save file>
//! <vault>/<title>/replay/<mtime>_<name>.rpy
//! <vault>/<title>/snapshot/<mtime>_<name>.bmp
//! ```
//!
//! ## Collaborators
//!
//! Everything that touches the outside world sits behind a trait so tests
//! can substitute it:
//!
//! - [`Clock`](clock::Clock) for timestamps in backup names and events
//! - [`MetadataProvider`](metadata::MetadataProvider) for file snapshots
//! - [`SafetyOracle`](safety::SafetyOracle) for the "game running or file
//!   locked" check before a push
//! - [`ConflictResolver`](conflict::ConflictResolver) for interactive
//!   conflict prompts
//! - [`EventSink`](events::EventSink) for structured operation logs
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<T, SyncError>`. A failure on one
//! title inside a batch is recorded and the batch moves on; refusals such
//! as [`SyncError::LocalNewer`] are ordinary errors for the caller to
//! report.
//!
//! ## Module Organization
//!
//! - [`comparator`]: the decision function
//! - [`transfer`]: single-title pulls and pushes
//! - [`backup`]: history creation, listing, restore and trimming
//! - [`archive`]: content-deduplicated replay and snapshot archiving
//! - [`session`]: batch runner over configured titles
//! - [`config`]: runtime settings and the JSON documents in the data directory
//! - [`titles`]: catalog of supported titles and save-file detection
//! - [`device`]: machine fingerprint
//! - [`events`]: structured event records and sinks

pub mod archive;
pub mod backup;
pub mod clock;
pub mod comparator;
pub mod config;
pub mod conflict;
pub mod device;
pub mod error;
pub mod events;
pub mod metadata;
pub mod safety;
pub mod session;
pub mod titles;
pub mod transfer;
pub mod types;
pub mod utils;
pub mod vault;

pub use backup::BackupStore;
pub use clock::{Clock, SystemClock};
pub use comparator::compare;
pub use config::{ConfigStore, PathRegistry, Rules, SyncConfig, SyncConfigBuilder};
pub use conflict::{ConflictChoice, ConflictResolver};
pub use error::{Result, SyncError};
pub use events::{Event, EventSink};
pub use session::{BatchReport, BatchSummary, SyncSession, SyncSessionBuilder};
pub use transfer::Orchestrator;
pub use types::*;
pub use vault::VaultLayout;
