use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SyncError;

/// Lock file created under an installed root while an update runs against it.
pub const LOCK_FILE: &str = ".lockstep.lock";

/// Who holds a root, as recorded in the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    pub pid: u32,
    pub started_at_unix: u64,
    pub target_version: String,
}

/// Exclusive claim on one installed root for the lifetime of an update run.
///
/// Acquisition never waits: if the lock file already exists the caller gets
/// [`SyncError::RootBusy`]. The file is removed when the guard drops, on
/// success and failure alike. A lock left behind by a crashed process must be
/// removed by hand; the `RootBusy` error names its path.
#[derive(Debug)]
pub struct RootLock {
    lock_path: PathBuf,
}

impl RootLock {
    pub fn acquire(root: &Path, target_version: &str) -> Result<Self, SyncError> {
        fs::create_dir_all(root).map_err(|source| SyncError::Lock {
            path: root.to_path_buf(),
            source,
        })?;
        let lock_path = root.join(LOCK_FILE);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SyncError::RootBusy {
                    root: root.to_path_buf(),
                    holder: read_metadata(&lock_path),
                    lock_path,
                });
            }
            Err(source) => return Err(SyncError::Lock { path: lock_path, source }),
        };

        // from here on the guard owns the file and removes it on any early return
        let guard = RootLock { lock_path };
        let metadata = LockMetadata {
            pid: std::process::id(),
            started_at_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            target_version: target_version.to_string(),
        };
        let written = serde_json::to_vec_pretty(&metadata)
            .map_err(io::Error::other)
            .and_then(|bytes| file.write_all(&bytes));
        if let Err(source) = written {
            return Err(SyncError::Lock {
                path: guard.lock_path.clone(),
                source,
            });
        }
        debug!(lock = %guard.lock_path.display(), "root locked");
        Ok(guard)
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            warn!(lock = %self.lock_path.display(), error = %e, "could not remove lock file");
        } else {
            debug!(lock = %self.lock_path.display(), "root unlocked");
        }
    }
}

fn read_metadata(lock_path: &Path) -> Option<LockMetadata> {
    let contents = fs::read_to_string(lock_path).ok()?;
    serde_json::from_str(&contents).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_writes_metadata() {
        let dir = tempdir().unwrap();
        let lock = RootLock::acquire(dir.path(), "1.2.3").unwrap();
        let metadata = read_metadata(lock.lock_path()).unwrap();
        assert_eq!(metadata.pid, std::process::id());
        assert_eq!(metadata.target_version, "1.2.3");
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let dir = tempdir().unwrap();
        let _held = RootLock::acquire(dir.path(), "1").unwrap();
        let err = RootLock::acquire(dir.path(), "2").unwrap_err();
        match err {
            SyncError::RootBusy { holder, .. } => {
                assert_eq!(holder.unwrap().target_version, "1");
            }
            other => panic!("expected RootBusy, got {other:?}"),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        {
            let _lock = RootLock::acquire(dir.path(), "1").unwrap();
            assert!(dir.path().join(LOCK_FILE).exists());
        }
        assert!(!dir.path().join(LOCK_FILE).exists());
        let _again = RootLock::acquire(dir.path(), "2").unwrap();
    }

    #[test]
    fn test_acquire_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("not").join("yet");
        let _lock = RootLock::acquire(&root, "1").unwrap();
        assert!(root.is_dir());
    }
}
