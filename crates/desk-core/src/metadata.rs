//! Metadata extraction for shared folders.
//!
//! Derives a dat's title, author, and size from its folder on disk: the
//! optional `dat.json` manifest at the root wins, the folder base name and
//! the caller identity fill the gaps, and the size is an exact recursive
//! byte sum at scan time.

use crate::config::StoreConfig;
use crate::error::{DeskError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// Optional manifest at the root of a shared folder.
///
/// Dat manifests use lowercase keys. Every field is optional so a partial
/// manifest parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatManifest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Metadata derived from a folder scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMetadata {
    pub title: String,
    pub author: String,
    pub size_bytes: u64,
}

/// Read and parse `dat.json` from a folder root, if present.
///
/// A corrupt or unreadable manifest is logged and treated as absent; it
/// never fails extraction.
pub fn read_manifest(dir: &Path) -> Option<DatManifest> {
    let path = dir.join(StoreConfig::MANIFEST_FILE);
    if !path.exists() {
        return None;
    }

    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read manifest {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!("Ignoring unparseable manifest {}: {}", path.display(), e);
            None
        }
    }
}

/// Recursive size of all regular files under `dir`, in bytes.
///
/// Symlinks are not followed. Entries that cannot be read are skipped with a
/// warning; the scan is best-effort below the root.
pub fn folder_size(dir: &Path) -> u64 {
    let mut total = 0u64;

    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file() {
            match entry.metadata() {
                Ok(meta) => total += meta.len(),
                Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }
    }

    total
}

/// Extract metadata for a folder being shared as a dat.
///
/// This walks the whole folder; callers on the async runtime should wrap it
/// in `tokio::task::spawn_blocking`.
///
/// # Arguments
///
/// * `dir` - Folder to scan. Must exist and be a directory.
/// * `fallback_author` - Identity recorded when the manifest names no author.
pub fn extract(dir: &Path, fallback_author: &str) -> Result<FolderMetadata> {
    if !dir.exists() {
        return Err(DeskError::FileNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(DeskError::NotADirectory(dir.to_path_buf()));
    }

    let manifest = read_manifest(dir).unwrap_or_default();

    let title = manifest.title.filter(|t| !t.is_empty()).unwrap_or_else(|| {
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let author = manifest
        .author
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| fallback_author.to_string());

    Ok(FolderMetadata {
        title,
        author,
        size_bytes: folder_size(dir),
    })
}
