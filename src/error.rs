use std::path::PathBuf;
use thiserror::Error;

use crate::lock::LockMetadata;
use crate::transfer::Phase;

/// Errors raised by a [`RemoteFetcher`](crate::fetch::RemoteFetcher).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The transport failed before a response arrived (DNS, connect, timeout, body read).
    #[error("could not reach {url}: {reason}")]
    Unreachable { url: String, reason: String },
    /// The server answered with a non-success status.
    #[error("{url} answered with HTTP {status}")]
    HttpStatus { url: String, status: u16 },
}

/// Errors raised by a [`FileStore`](crate::store::FileStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("i/o error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path)
        } else {
            StoreError::Io { path, source }
        }
    }
}

/// Everything an update run can fail with.
///
/// Every variant reaches the caller of
/// [`UpdateOrchestrator::run`](crate::orchestrator::UpdateOrchestrator::run) as-is.
/// Nothing is retried inside the crate; the recovery for any of them is to run again.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("manifest at {url} is unreachable")]
    ManifestUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("manifest at {url} is malformed: {reason}")]
    ManifestMalformed { url: String, reason: String },

    #[error("failed to transfer '{path}'")]
    Transfer {
        path: String,
        #[source]
        source: TransferCause,
    },

    #[error("failed to persist version marker at '{}'", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("{} is busy: another update holds {}", .root.display(), .lock_path.display())]
    RootBusy {
        root: PathBuf,
        lock_path: PathBuf,
        holder: Option<LockMetadata>,
    },

    #[error("lock file '{}' could not be created", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("update cancelled before {phase}")]
    Cancelled { phase: Phase },
}

/// Why a single file failed during the transfer phase.
#[derive(Debug, Error)]
pub enum TransferCause {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("downloaded content hashes to {actual}, manifest expects {expected}")]
    HashMismatch { expected: String, actual: String },
    #[error("path is empty or escapes the installed root")]
    InvalidPath,
}

impl SyncError {
    /// The relative path that failed, for transfer failures.
    pub fn failed_path(&self) -> Option<&str> {
        match self {
            SyncError::Transfer { path, .. } => Some(path),
            _ => None,
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
