//! JSON-file persistence for the dat registry.
//!
//! One snapshot file holds the full record set. Loads never fail: a corrupt
//! element is skipped, a corrupt file degrades to an empty registry. Saves
//! are all-or-nothing:
//! 1. Serialize to a temp file with unique PID+TID suffix
//! 2. Validate the JSON by re-parsing
//! 3. sync to ensure data reaches disk
//! 4. Atomic rename to the target path

use crate::config::StoreConfig;
use crate::dat::Dat;
use crate::error::{DeskError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::{debug, warn};

/// Persisted subset of a dat.
///
/// Runtime state (status, peer counts, transfer totals) never lands here;
/// restarts rebuild it from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatRecord {
    pub id: String,
    pub local_path: PathBuf,
    pub title: String,
    pub author: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Share link. Older snapshots may lack it; the registry mints a fresh
    /// one on restore.
    #[serde(default)]
    pub link: String,
    #[serde(default = "DatRecord::default_origin")]
    pub origin: crate::dat::DatOrigin,
}

impl DatRecord {
    pub fn from_dat(dat: &Dat) -> Self {
        Self {
            id: dat.id.clone(),
            local_path: dat.local_path.clone(),
            title: dat.title.clone(),
            author: dat.author.clone(),
            size_bytes: dat.size_bytes,
            created_at: dat.created_at,
            link: dat.link.clone(),
            origin: dat.origin,
        }
    }

    fn default_origin() -> crate::dat::DatOrigin {
        crate::dat::DatOrigin::Created
    }
}

/// File-backed store for the registry snapshot.
pub struct RegistryStore {
    path: PathBuf,
    keep_backup: bool,
}

impl RegistryStore {
    /// Create a store rooted at `data_dir`. Nothing is touched on disk until
    /// the first `save`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(StoreConfig::STORE_FILE),
            keep_backup: StoreConfig::KEEP_BACKUP,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every parseable record from the snapshot. Never fails.
    ///
    /// A missing file is a first run. An unreadable or non-array file logs a
    /// warning and yields an empty registry. Individual elements that fail to
    /// parse are skipped so partial corruption costs only the affected dats.
    pub fn load(&self) -> Vec<DatRecord> {
        if !self.path.exists() {
            debug!("No store file at {}, starting empty", self.path.display());
            return Vec::new();
        }

        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read store {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let raw: Vec<serde_json::Value> = match serde_json::from_str(&contents) {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    "Store file {} is not a JSON array, starting empty: {}",
                    self.path.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut records = Vec::with_capacity(raw.len());
        for (index, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<DatRecord>(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping unparseable record {} in {}: {}",
                    index,
                    self.path.display(),
                    e
                ),
            }
        }

        records
    }

    /// Write the full record set atomically.
    ///
    /// On any failure the previous snapshot on disk is untouched.
    pub fn save(&self, records: &[DatRecord]) -> Result<()> {
        let serialized = serde_json::to_string_pretty(records).map_err(|e| DeskError::Json {
            message: format!("Failed to serialize registry: {}", e),
            source: Some(e),
        })?;

        // Validate what we are about to persist by re-parsing
        serde_json::from_str::<Vec<serde_json::Value>>(&serialized).map_err(|e| {
            DeskError::Json {
                message: format!("Registry snapshot validation failed: {}", e),
                source: Some(e),
            }
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| DeskError::io_with_path(e, parent))?;
            }
        }

        let temp_path = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| DeskError::io_with_path(e, &temp_path))?;

            file.write_all(serialized.as_bytes())
                .map_err(|e| DeskError::io_with_path(e, &temp_path))?;
            file.flush()
                .map_err(|e| DeskError::io_with_path(e, &temp_path))?;
            file.sync_all()
                .map_err(|e| DeskError::io_with_path(e, &temp_path))?;
        }

        if self.keep_backup && self.path.exists() {
            let backup_path = self.path.with_extension("json.bak");
            if let Err(e) = fs::copy(&self.path, &backup_path) {
                warn!("Failed to create backup {}: {}", backup_path.display(), e);
            } else {
                debug!("Created backup: {}", backup_path.display());
            }
        }

        fs::rename(&temp_path, &self.path).map_err(|e| DeskError::Io {
            message: format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            ),
            path: Some(self.path.clone()),
            source: Some(e),
        })?;

        debug!(
            "Persisted {} dat records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Unique temp file name so concurrent writers cannot collide.
    fn temp_path(&self) -> PathBuf {
        let pid = process::id();
        let tid = thread_id();
        self.path.with_extension(format!("json.{}.{}.tmp", pid, tid))
    }
}

/// Get a unique thread identifier.
fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", thread::current().id()).hash(&mut hasher);
    hasher.finish()
}
