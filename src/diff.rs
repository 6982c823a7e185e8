use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::hash::{hashes_match, HashProvider};
use crate::ledger::VERSION_FILE;
use crate::lock::LOCK_FILE;
use crate::manifest::ManifestEntry;
use crate::store::FileStore;
use crate::util::{normalize_relative_path, resolve_in_root};

/// Entries whose local content is missing or differs from the manifest, in manifest order.
pub type DiffResult = Vec<ManifestEntry>;

/// Compares manifest entries against the files under `root`.
pub struct DiffEngine<'a> {
    store: &'a dyn FileStore,
    hasher: &'a dyn HashProvider,
}

impl<'a> DiffEngine<'a> {
    pub fn new(store: &'a dyn FileStore, hasher: &'a dyn HashProvider) -> Self {
        Self { store, hasher }
    }

    /// Returns the entries that must be fetched, in the order they appear in `entries`.
    ///
    /// A file that cannot be read or hashed counts as a mismatch: it is re-downloaded
    /// rather than trusted. The result depends only on `entries` and the disk, so
    /// calling this twice without writes in between gives the same answer.
    pub fn compute_diff(&self, entries: &[ManifestEntry], root: &Path) -> DiffResult {
        entries
            .iter()
            .filter(|entry| self.needs_fetch(entry, root))
            .cloned()
            .collect()
    }

    fn needs_fetch(&self, entry: &ManifestEntry, root: &Path) -> bool {
        let Some(relative_path) = normalize_relative_path(&entry.relative_path) else {
            warn!(path = %entry.relative_path, "unusable path, scheduling for fetch");
            return true;
        };
        let local = resolve_in_root(root, &relative_path);
        if !self.store.exists(&local) {
            debug!(path = %relative_path, "missing");
            return true;
        }
        match self.store.read_binary(&local) {
            Ok(bytes) => {
                let actual = self.hasher.digest(&bytes);
                let matches = hashes_match(&actual, &entry.expected_hash);
                if !matches {
                    debug!(path = %relative_path, expected = %entry.expected_hash, actual = %actual, "hash mismatch");
                }
                !matches
            }
            Err(e) => {
                warn!(path = %relative_path, error = %e, "could not hash local file, scheduling for fetch");
                true
            }
        }
    }
}

/// Lists files under `root` that no manifest entry names, as sorted forward-slash paths.
///
/// The version marker and the lock file are bookkeeping and never reported.
pub fn find_untracked(entries: &[ManifestEntry], root: &Path) -> Vec<String> {
    let tracked: HashSet<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
    let mut untracked = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if relative == VERSION_FILE || relative == LOCK_FILE {
            continue;
        }
        if !tracked.contains(relative.as_str()) {
            untracked.push(relative);
        }
    }
    untracked.sort();
    untracked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sha256Hasher;
    use crate::store::LocalFileStore;
    use tempfile::tempdir;

    fn sha(bytes: &[u8]) -> String {
        Sha256Hasher.digest(bytes)
    }

    #[test]
    fn test_missing_file_is_included() {
        let dir = tempdir().unwrap();
        let engine = DiffEngine::new(&LocalFileStore, &Sha256Hasher);
        let entries = vec![ManifestEntry::new("a.txt", "h1")];
        assert_eq!(engine.compute_diff(&entries, dir.path()), entries);
    }

    #[test]
    fn test_matching_file_is_excluded_and_mismatch_included() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"stale").unwrap();
        let entries = vec![
            ManifestEntry::new("a.txt", sha(b"alpha")),
            ManifestEntry::new("b.txt", sha(b"fresh")),
        ];
        let engine = DiffEngine::new(&LocalFileStore, &Sha256Hasher);
        assert_eq!(engine.compute_diff(&entries, dir.path()), vec![entries[1].clone()]);
    }

    #[test]
    fn test_diff_preserves_manifest_order() {
        let dir = tempdir().unwrap();
        let entries = vec![
            ManifestEntry::new("z.bin", "1"),
            ManifestEntry::new("a.bin", "2"),
            ManifestEntry::new("m/k.bin", "3"),
        ];
        let engine = DiffEngine::new(&LocalFileStore, &Sha256Hasher);
        let diff = engine.compute_diff(&entries, dir.path());
        let paths: Vec<_> = diff.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["z.bin", "a.bin", "m/k.bin"]);
    }

    #[test]
    fn test_backslash_paths_are_normalized() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data").join("x.bin"), b"x").unwrap();
        let entries = vec![ManifestEntry::new("data\\x.bin", sha(b"x"))];
        let engine = DiffEngine::new(&LocalFileStore, &Sha256Hasher);
        assert!(engine.compute_diff(&entries, dir.path()).is_empty());
    }

    #[test]
    fn test_unreadable_file_counts_as_mismatch() {
        struct BrokenStore;
        impl FileStore for BrokenStore {
            fn exists(&self, _: &Path) -> bool {
                true
            }
            fn read_text(&self, p: &Path) -> Result<String, crate::error::StoreError> {
                Err(crate::error::StoreError::NotFound(p.to_path_buf()))
            }
            fn read_binary(&self, p: &Path) -> Result<Vec<u8>, crate::error::StoreError> {
                Err(crate::error::StoreError::Io {
                    path: p.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                })
            }
            fn write_binary(&self, _: &Path, _: &[u8]) -> Result<(), crate::error::StoreError> {
                Ok(())
            }
            fn ensure_dir(&self, _: &Path) -> Result<(), crate::error::StoreError> {
                Ok(())
            }
            fn delete(&self, _: &Path) -> Result<(), crate::error::StoreError> {
                Ok(())
            }
        }
        let entries = vec![ManifestEntry::new("a.txt", "h1")];
        let engine = DiffEngine::new(&BrokenStore, &Sha256Hasher);
        assert_eq!(engine.compute_diff(&entries, Path::new("/root")), entries);
    }

    #[test]
    fn test_compute_diff_is_idempotent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        let entries = vec![
            ManifestEntry::new("a.txt", sha(b"alpha")),
            ManifestEntry::new("b.txt", sha(b"beta")),
        ];
        let engine = DiffEngine::new(&LocalFileStore, &Sha256Hasher);
        let first = engine.compute_diff(&entries, dir.path());
        let second = engine.compute_diff(&entries, dir.path());
        assert_eq!(first, second);
    }

    #[test]
    fn test_find_untracked_skips_bookkeeping() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub").join("extra.log"), b"x").unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), b"1.0").unwrap();
        let entries = vec![ManifestEntry::new("a.txt", "h")];
        assert_eq!(find_untracked(&entries, dir.path()), vec!["sub/extra.log".to_string()]);
    }
}
