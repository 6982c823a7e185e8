use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::StoreError;

/// Local filesystem operations the synchronizer needs.
///
/// Paths passed in are always absolute (already joined onto the installed root).
pub trait FileStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn read_text(&self, path: &Path) -> Result<String, StoreError>;
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>, StoreError>;
    fn write_text(&self, path: &Path, text: &str) -> Result<(), StoreError> {
        self.write_binary(path, text.as_bytes())
    }
    fn write_binary(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError>;
    fn ensure_dir(&self, path: &Path) -> Result<(), StoreError>;
    fn delete(&self, path: &Path) -> Result<(), StoreError>;
}

/// [`FileStore`] backed by `std::fs`.
///
/// Writes go to a temporary file in the destination directory which is then
/// renamed over the target, so readers never observe a half-written file.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileStore;

impl FileStore for LocalFileStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_text(&self, path: &Path) -> Result<String, StoreError> {
        std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        std::fs::read(path).map_err(|e| StoreError::io(path, e))
    }

    fn write_binary(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        tmp.write_all(bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
        Ok(())
    }

    fn ensure_dir(&self, path: &Path) -> Result<(), StoreError> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::io(path, e))
    }

    fn delete(&self, path: &Path) -> Result<(), StoreError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_binary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        LocalFileStore.write_binary(&path, &[0, 1, 2, 255]).unwrap();
        assert!(LocalFileStore.exists(&path));
        assert_eq!(LocalFileStore.read_binary(&path).unwrap(), vec![0, 1, 2, 255]);
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        LocalFileStore.write_text(&path, "old contents, longer").unwrap();
        LocalFileStore.write_text(&path, "new").unwrap();
        assert_eq!(LocalFileStore.read_text(&path).unwrap(), "new");
        // no temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let err = LocalFileStore.read_text(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_exists_is_false_for_directories() {
        let dir = tempdir().unwrap();
        LocalFileStore.ensure_dir(&dir.path().join("a/b")).unwrap();
        assert!(!LocalFileStore.exists(&dir.path().join("a/b")));
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone");
        LocalFileStore.delete(&path).unwrap();
        LocalFileStore.write_text(&path, "x").unwrap();
        LocalFileStore.delete(&path).unwrap();
        assert!(!path.exists());
    }
}
