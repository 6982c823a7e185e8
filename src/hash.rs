use serde::{Deserialize, Serialize};
use md5::Md5;
use sha2::{Digest, Sha256};

/// Computes a deterministic content digest for a byte slice.
///
/// Digests are only compared against manifest hashes; they are never persisted
/// and are not treated as a security boundary.
pub trait HashProvider: Send + Sync {
    /// Returns the lowercase hex digest of `bytes`.
    fn digest(&self, bytes: &[u8]) -> String;
}

/// SHA-256, hex encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl HashProvider for Sha256Hasher {
    fn digest(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

/// MD5, hex encoded. Matches filelists produced by older publishing tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Hasher;

impl HashProvider for Md5Hasher {
    fn digest(&self, bytes: &[u8]) -> String {
        hex::encode(Md5::digest(bytes))
    }
}

/// BLAKE3, hex encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl HashProvider for Blake3Hasher {
    fn digest(&self, bytes: &[u8]) -> String {
        blake3::hash(bytes).to_hex().to_string()
    }
}

/// The digest a manifest was authored with, as named in `lockstep.toml`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
    Md5,
}

impl HashAlgorithm {
    pub fn provider(self) -> Box<dyn HashProvider> {
        match self {
            HashAlgorithm::Sha256 => Box::new(Sha256Hasher),
            HashAlgorithm::Blake3 => Box::new(Blake3Hasher),
            HashAlgorithm::Md5 => Box::new(Md5Hasher),
        }
    }
}

/// Strips an `<algo>:` prefix such as `sha256:` from a hash if present.
pub fn format_hash(hash: &str) -> &str {
    match hash.split_once(':') {
        Some((_, digest)) => digest.trim(),
        None => hash.trim(),
    }
}

/// Compares a computed digest with a manifest hash, ignoring case and any algorithm prefix.
pub fn hashes_match(actual: &str, expected: &str) -> bool {
    format_hash(actual).eq_ignore_ascii_case(format_hash(expected))
}
