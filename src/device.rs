//! Device fingerprint
//!
//! A machine is identified by the SHA-256 of its hostname followed by the
//! lowercase MAC address of its first non-loopback interface. The first 12
//! hex characters are the device id used as a key in `paths.json`.

use crate::config::Device;
use crate::error::{Result, SyncError};
use crate::utils::hash_data;
use chrono::{DateTime, Utc};
use sysinfo::Networks;
use tracing::debug;

/// Length of a device id
pub const DEVICE_ID_LEN: usize = 12;

/// Identity of the machine this run is on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// First 12 hex characters of the fingerprint
    pub id: String,
    /// `sha256:<full hex>`
    pub hash: String,
    pub hostname: String,
}

impl DeviceIdentity {
    /// Fingerprint a hostname and MAC address
    pub fn from_parts(hostname: &str, mac: &str) -> Self {
        let full = hash_data(format!("{}{}", hostname, mac.to_lowercase()).as_bytes());
        Self {
            id: full[..DEVICE_ID_LEN].to_string(),
            hash: format!("sha256:{}", full),
            hostname: hostname.to_string(),
        }
    }

    /// Fingerprint the current machine
    pub fn detect() -> Result<Self> {
        let hostname = hostname::get()?.to_string_lossy().into_owned();
        let mac = primary_mac()?;
        debug!("Device fingerprint from {} / {}", hostname, mac);
        Ok(Self::from_parts(&hostname, &mac))
    }

    /// Registry entry for this device
    pub fn to_device(&self, last_seen: DateTime<Utc>) -> Device {
        Device {
            id: self.id.clone(),
            hostname: self.hostname.clone(),
            mac_hash: self.hash.clone(),
            last_seen,
        }
    }
}

/// Lowercase MAC of the first non-loopback interface with a hardware address
///
/// Interfaces are considered in name order so the choice is stable.
fn primary_mac() -> Result<String> {
    let networks = Networks::new_with_refreshed_list();
    let mut names: Vec<&String> = networks.list().keys().collect();
    names.sort();

    names
        .into_iter()
        .filter(|name| !is_loopback(name))
        .filter_map(|name| networks.list().get(name))
        .map(|data| data.mac_address())
        .find(|mac| !mac.is_unspecified())
        .map(|mac| mac.to_string().to_lowercase())
        .ok_or_else(|| SyncError::custom("no valid network interface found"))
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.to_ascii_lowercase().contains("loopback")
}
