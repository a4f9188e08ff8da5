//! Centralized configuration for the dat-desk engine.
//!
//! This module provides configuration constants for persistence, sync session
//! behavior, and change notification timing.

use std::path::PathBuf;
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Dat Desktop";
    pub const DATA_DIR_NAME: &'static str = "dat-desk";
}

/// Persistence store configuration.
pub struct StoreConfig;

impl StoreConfig {
    /// Registry snapshot file inside the data directory.
    pub const STORE_FILE: &'static str = "dats.json";
    /// Optional manifest file at the root of a shared folder.
    pub const MANIFEST_FILE: &'static str = "dat.json";
    /// Keep a `.bak` copy of the previous store snapshot on save.
    pub const KEEP_BACKUP: bool = false;
}

/// Sync session configuration.
pub struct SyncConfig;

impl SyncConfig {
    // Swarm rejoin backoff
    pub const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);
    pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

    // Session teardown
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

    // Stats event channel shared by all sessions
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}

/// Change notification timing.
pub struct NotifyConfig;

impl NotifyConfig {
    /// Bursts of changes inside this window collapse into one callback round.
    pub const COALESCE_WINDOW: Duration = Duration::from_millis(25);
}

/// Default data directory: platform data dir + app folder, falling back to
/// the current directory when the platform dir cannot be determined.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(AppConfig::DATA_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_data_dir_ends_with_app_folder() {
        let dir = default_data_dir();
        assert!(dir.ends_with(AppConfig::DATA_DIR_NAME));
    }

    #[test]
    fn test_backoff_bounds_sane() {
        assert!(SyncConfig::BASE_RETRY_DELAY < SyncConfig::MAX_RETRY_DELAY);
        assert!(SyncConfig::STOP_TIMEOUT > Duration::ZERO);
    }
}
