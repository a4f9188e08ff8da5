//! Core domain types for tracked dats.
//!
//! A `Dat` is one shared folder: static facts extracted at creation plus the
//! live status and network counters its sync session maintains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a dat entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatOrigin {
    /// Shared from a local folder by this user.
    Created,
    /// Replicated from a link shared by someone else.
    Imported,
}

/// Lifecycle status of a tracked dat.
///
/// Removal is absence from the registry, not a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatStatus {
    /// Created but not yet committed; not visible via `list()`.
    Initializing,
    /// Tracked and syncing (or trying to).
    Active,
    /// Deletion in progress; stats are frozen.
    Closing,
}

/// Live network counters for a dat. Runtime-only, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    /// Currently connected peers.
    pub peers: u32,
    /// Total bytes received this session. Monotonic.
    pub downloaded_bytes: u64,
    /// Total bytes sent this session. Monotonic.
    pub uploaded_bytes: u64,
}

/// Full runtime view of a tracked dat.
///
/// Registry reads hand out clones of this; mutating a returned `Dat` has no
/// effect on the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dat {
    /// Stable unique identifier.
    pub id: String,
    /// Canonicalized folder being shared.
    pub local_path: PathBuf,
    /// Share link (`dat://<64 hex>`), the content address on the swarm.
    pub link: String,
    pub title: String,
    pub author: String,
    /// Recursive folder size measured at creation time.
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub origin: DatOrigin,
    pub status: DatStatus,
    #[serde(default)]
    pub stats: NetworkStats,
}

/// Format a byte count the way the desktop UI displays sizes.
///
/// Values at two digits or with no fractional part render without decimals,
/// everything else with one: `52 B`, `1.5 KB`, `15 KB`, `1 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let unit = UNITS[exponent];

    if value >= 10.0 || value.fract() == 0.0 {
        format!("{:.0} {}", value, unit)
    } else {
        format!("{:.1} {}", value, unit)
    }
}
