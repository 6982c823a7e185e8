use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diff::DiffResult;
use crate::error::{SyncError, TransferCause};
use crate::fetch::RemoteFetcher;
use crate::hash::{hashes_match, HashProvider};
use crate::manifest::ManifestEntry;
use crate::store::FileStore;
use crate::util::{join_url, normalize_relative_path, resolve_in_root};

/// Step of an update run a [`ProgressEvent`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    FetchManifest,
    Diff,
    Download,
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::FetchManifest => "fetch_manifest",
            Phase::Diff => "diff",
            Phase::Download => "download",
            Phase::Commit => "commit",
        })
    }
}

/// Read-only progress notification.
///
/// Counts are per phase and never decrease within a phase. Ignoring every
/// event is always correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub completed: usize,
    pub total: usize,
    pub current_path: Option<String>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, completed: usize, total: usize) -> Self {
        Self {
            phase,
            completed,
            total,
            current_path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.current_path = Some(path.into());
        self
    }
}

/// Cooperative cancellation flag, shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Downloads a diff into an installed root, strictly one file after another.
pub struct TransferPlanner<'a> {
    fetcher: &'a dyn RemoteFetcher,
    store: &'a dyn FileStore,
    verifier: Option<&'a dyn HashProvider>,
}

impl<'a> TransferPlanner<'a> {
    pub fn new(fetcher: &'a dyn RemoteFetcher, store: &'a dyn FileStore) -> Self {
        Self {
            fetcher,
            store,
            verifier: None,
        }
    }

    /// Checks each downloaded body against its manifest hash before writing it.
    /// A body that does not match fails the transfer and is never written.
    pub fn with_verification(mut self, hasher: &'a dyn HashProvider) -> Self {
        self.verifier = Some(hasher);
        self
    }

    /// Fetches every entry of `diff` from `download_base_url` into `root`, in order.
    ///
    /// Stops at the first entry whose fetch or write fails and reports it as
    /// [`SyncError::Transfer`]. Files written before the failure stay on disk.
    /// `cancel` is checked between files, never in the middle of one.
    pub fn execute(
        &self,
        diff: &DiffResult,
        download_base_url: &str,
        root: &Path,
        on_progress: &mut dyn FnMut(&ProgressEvent),
        cancel: &CancelToken,
    ) -> Result<(), SyncError> {
        let total = diff.len();
        on_progress(&ProgressEvent::new(Phase::Download, 0, total));

        for (index, entry) in diff.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(completed = index, total, "transfer cancelled");
                return Err(SyncError::Cancelled { phase: Phase::Download });
            }
            let relative_path =
                normalize_relative_path(&entry.relative_path).ok_or_else(|| SyncError::Transfer {
                    path: entry.relative_path.clone(),
                    source: TransferCause::InvalidPath,
                })?;

            self.transfer_one(entry, &relative_path, download_base_url, root)
                .map_err(|source| {
                    warn!(path = %relative_path, error = %source, "transfer failed");
                    SyncError::Transfer {
                        path: relative_path.clone(),
                        source,
                    }
                })?;

            on_progress(&ProgressEvent::new(Phase::Download, index + 1, total).with_path(&relative_path));
        }
        info!(files = total, "transfer complete");
        Ok(())
    }

    fn transfer_one(
        &self,
        entry: &ManifestEntry,
        relative_path: &str,
        download_base_url: &str,
        root: &Path,
    ) -> Result<(), TransferCause> {
        let destination = resolve_in_root(root, relative_path);
        if let Some(parent) = destination.parent() {
            self.store.ensure_dir(parent)?;
        }
        let url = join_url(download_base_url, relative_path);
        let bytes = self.fetcher.get_bytes(&url)?;
        if let Some(hasher) = self.verifier {
            let actual = hasher.digest(&bytes);
            if !hashes_match(&actual, &entry.expected_hash) {
                return Err(TransferCause::HashMismatch {
                    expected: entry.expected_hash.clone(),
                    actual,
                });
            }
        }
        self.store.write_binary(&destination, &bytes)?;
        debug!(path = relative_path, bytes = bytes.len(), "file written");
        Ok(())
    }
}
