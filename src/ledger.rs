use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{StoreError, SyncError};
use crate::store::FileStore;

/// Sidecar file under the installed root holding the version marker.
pub const VERSION_FILE: &str = "version.txt";

/// The version an installed root is known to satisfy.
///
/// Versions are opaque tokens: they are compared for equality only, never ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionMarker {
    /// No marker has been written yet; the root needs a full update.
    Unknown,
    Known(String),
}

impl VersionMarker {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VersionMarker::Unknown => None,
            VersionMarker::Known(v) => Some(v),
        }
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionMarker::Unknown => f.write_str("unknown"),
            VersionMarker::Known(v) => f.write_str(v),
        }
    }
}

/// Whether a root at `marker` must be updated to reach `target`.
///
/// Surrounding whitespace is not part of a version token.
pub fn needs_update(marker: &VersionMarker, target: &str) -> bool {
    marker.as_str() != Some(target.trim())
}

/// Reads and commits the version marker of an installed root.
pub struct VersionLedger<'a> {
    store: &'a dyn FileStore,
}

impl<'a> VersionLedger<'a> {
    pub fn new(store: &'a dyn FileStore) -> Self {
        Self { store }
    }

    pub fn marker_path(root: &Path) -> PathBuf {
        root.join(VERSION_FILE)
    }

    /// Returns the persisted marker, or [`VersionMarker::Unknown`] when there is none.
    ///
    /// An empty marker file and an unreadable one both read as `Unknown`, which
    /// only ever causes a full re-diff.
    pub fn read(&self, root: &Path) -> VersionMarker {
        let path = Self::marker_path(root);
        if !self.store.exists(&path) {
            return VersionMarker::Unknown;
        }
        match self.store.read_text(&path) {
            Ok(text) if !text.trim().is_empty() => VersionMarker::Known(text.trim().to_string()),
            Ok(_) => VersionMarker::Unknown,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable version marker");
                VersionMarker::Unknown
            }
        }
    }

    /// Commits `version` as the root's marker.
    ///
    /// This is the single commit point of an update and must only be called once
    /// every file of the plan is on disk.
    pub fn write(&self, root: &Path, version: &str) -> Result<(), SyncError> {
        let path = Self::marker_path(root);
        let persist = |source: StoreError| SyncError::Persist {
            path: path.clone(),
            source,
        };
        self.store.ensure_dir(root).map_err(persist)?;
        self.store.write_text(&path, version.trim()).map_err(persist)?;
        info!(root = %root.display(), version, "version marker committed");
        Ok(())
    }
}
