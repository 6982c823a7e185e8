//! Remote manifest retrieval and parsing.
//!
//! A manifest is a JSON array of records, each naming a file (`file`, or `path`)
//! and its expected content hash (`hash`, or `checksum`). Any other fields are ignored:
//!
//! ```json
//! [
//!   { "file": "bin/game.exe", "hash": "9f86d08...", "size": 1024 },
//!   { "file": "data\\maps\\a.bin", "hash": "sha256:60303ae..." }
//! ]
//! ```
//!
//! Parsing is all-or-nothing: a single bad record rejects the whole manifest.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::fetch::RemoteFetcher;
use crate::ledger::VERSION_FILE;
use crate::lock::LOCK_FILE;
use crate::util::normalize_relative_path;

/// One expected file: where it lives under the root and what its content hashes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Forward-slash path relative to the installed root.
    pub relative_path: String,
    pub expected_hash: String,
}

impl ManifestEntry {
    pub fn new(relative_path: impl Into<String>, expected_hash: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            expected_hash: expected_hash.into(),
        }
    }
}

const PATH_FIELDS: [&str; 2] = ["file", "path"];
const HASH_FIELDS: [&str; 2] = ["hash", "checksum"];
/// Files under the root that belong to lockstep itself and may not be synced.
const RESERVED_PATHS: [&str; 2] = [VERSION_FILE, LOCK_FILE];

/// Fetches and parses manifests through a [`RemoteFetcher`].
pub struct ManifestResolver<'a> {
    fetcher: &'a dyn RemoteFetcher,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(fetcher: &'a dyn RemoteFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetches the manifest at `manifest_url` and returns its entries in manifest order.
    ///
    /// # Errors
    ///
    /// [`SyncError::ManifestUnreachable`] when the fetch fails, and
    /// [`SyncError::ManifestMalformed`] when the document is not a valid manifest.
    pub fn resolve(&self, manifest_url: &str) -> Result<Vec<ManifestEntry>, SyncError> {
        let bytes = self
            .fetcher
            .get_bytes(manifest_url)
            .map_err(|source| SyncError::ManifestUnreachable {
                url: manifest_url.to_string(),
                source,
            })?;
        let entries = parse_manifest(&bytes).map_err(|reason| SyncError::ManifestMalformed {
            url: manifest_url.to_string(),
            reason,
        })?;
        debug!(url = manifest_url, entries = entries.len(), "manifest resolved");
        Ok(entries)
    }
}

/// Parses a manifest document.
///
/// When two records name the same (normalized) path, the later record wins and
/// the earlier one is dropped; the survivor keeps its own position.
pub fn parse_manifest(bytes: &[u8]) -> Result<Vec<ManifestEntry>, String> {
    let document: Value = serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON: {e}"))?;
    let records = document
        .as_array()
        .ok_or_else(|| "expected a JSON array of file records".to_string())?;

    let mut parsed = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let object = record
            .as_object()
            .ok_or_else(|| format!("record {index} is not an object"))?;
        let raw_path = string_field(object, &PATH_FIELDS)
            .ok_or_else(|| format!("record {index} has no file path"))?;
        let hash = string_field(object, &HASH_FIELDS)
            .ok_or_else(|| format!("record {index} has no hash"))?;
        if hash.trim().is_empty() {
            return Err(format!("record {index} has an empty hash"));
        }
        let relative_path = normalize_relative_path(raw_path)
            .ok_or_else(|| format!("record {index} has an invalid path '{raw_path}'"))?;
        if RESERVED_PATHS.iter().any(|reserved| relative_path.eq_ignore_ascii_case(reserved)) {
            return Err(format!("record {index} names the reserved file '{relative_path}'"));
        }
        parsed.push(ManifestEntry::new(relative_path, hash.trim()));
    }

    Ok(dedup_last_wins(parsed))
}

fn string_field<'v>(object: &'v serde_json::Map<String, Value>, names: &[&str]) -> Option<&'v str> {
    names.iter().find_map(|name| object.get(*name).and_then(Value::as_str))
}

fn dedup_last_wins(entries: Vec<ManifestEntry>) -> Vec<ManifestEntry> {
    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        last_index.insert(entry.relative_path.as_str(), i);
    }
    if last_index.len() == entries.len() {
        return entries;
    }
    warn!(
        duplicates = entries.len() - last_index.len(),
        "manifest lists some paths more than once; keeping the last record for each"
    );
    let keep: Vec<bool> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| last_index[entry.relative_path.as_str()] == i)
        .collect();
    entries
        .into_iter()
        .zip(keep)
        .filter_map(|(entry, keep)| keep.then_some(entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    struct StaticFetcher(Result<Vec<u8>, FetchError>);

    impl RemoteFetcher for StaticFetcher {
        fn get_bytes(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_parse_reads_file_and_hash_fields() {
        let doc = br#"[{"file": "a.txt", "hash": "h1", "size": 3}, {"path": "dir\\b.txt", "checksum": "h2"}]"#;
        let entries = parse_manifest(doc).unwrap();
        assert_eq!(
            entries,
            vec![ManifestEntry::new("a.txt", "h1"), ManifestEntry::new("dir/b.txt", "h2")]
        );
    }

    #[test]
    fn test_parse_empty_array_is_valid() {
        assert!(parse_manifest(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_missing_hash_rejects_whole_manifest() {
        let doc = br#"[{"file": "a.txt", "hash": "h1"}, {"file": "b.txt"}]"#;
        let err = parse_manifest(doc).unwrap_err();
        assert!(err.contains("record 1"));
    }

    #[test]
    fn test_missing_path_rejects_whole_manifest() {
        let doc = br#"[{"hash": "h1"}]"#;
        assert!(parse_manifest(doc).is_err());
    }

    #[test]
    fn test_non_array_and_non_object_are_malformed() {
        assert!(parse_manifest(br#"{"file": "a", "hash": "b"}"#).is_err());
        assert!(parse_manifest(br#"["a.txt"]"#).is_err());
        assert!(parse_manifest(b"not json").is_err());
    }

    #[test]
    fn test_escaping_path_is_malformed() {
        let doc = br#"[{"file": "../outside.txt", "hash": "h"}]"#;
        assert!(parse_manifest(doc).is_err());
    }

    #[test]
    fn test_bookkeeping_files_are_reserved() {
        for name in ["version.txt", "./.lockstep.lock", "VERSION.TXT"] {
            let doc = format!(r#"[{{"file": "a.txt", "hash": "h1"}}, {{"file": "{name}", "hash": "h2"}}]"#);
            let err = parse_manifest(doc.as_bytes()).unwrap_err();
            assert!(err.contains("reserved"), "{name}: {err}");
        }
        // only the root-level names are reserved
        let doc = br#"[{"file": "docs/version.txt", "hash": "h1"}]"#;
        assert_eq!(parse_manifest(doc).unwrap(), vec![ManifestEntry::new("docs/version.txt", "h1")]);
    }

    #[test]
    fn test_duplicate_paths_last_wins() {
        let doc = br#"[
            {"file": "a.txt", "hash": "old"},
            {"file": "b.txt", "hash": "h2"},
            {"file": "./a.txt", "hash": "new"}
        ]"#;
        let entries = parse_manifest(doc).unwrap();
        assert_eq!(
            entries,
            vec![ManifestEntry::new("b.txt", "h2"), ManifestEntry::new("a.txt", "new")]
        );
    }

    #[test]
    fn test_resolve_maps_fetch_failure_to_unreachable() {
        let fetcher = StaticFetcher(Err(FetchError::HttpStatus {
            url: "u".into(),
            status: 500,
        }));
        let err = ManifestResolver::new(&fetcher).resolve("u").unwrap_err();
        assert!(matches!(err, SyncError::ManifestUnreachable { .. }));
    }

    #[test]
    fn test_resolve_maps_parse_failure_to_malformed() {
        let fetcher = StaticFetcher(Ok(b"[{}]".to_vec()));
        let err = ManifestResolver::new(&fetcher).resolve("u").unwrap_err();
        assert!(matches!(err, SyncError::ManifestMalformed { .. }));
    }
}
