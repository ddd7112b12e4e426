//! Cryptographic hashing for artifact integrity
//!
//! Streams file contents through SHA-256 so arbitrarily large artifacts hash
//! in constant memory. The resulting [`Digest`] is the fingerprint recorded
//! in manifests and submitted to the ledger.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::audit::error::AuditError;

static DIGEST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{64}$").expect("digest pattern is valid")
});

/// Lowercase hex-encoded SHA-256 fingerprint of file contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest(String);

impl Digest {
    /// Validate a candidate digest string (64 lowercase hex chars)
    pub fn parse(value: &str) -> Result<Self> {
        if DIGEST_RE.is_match(value) {
            Ok(Digest(value.to_string()))
        } else {
            Err(anyhow!(
                "invalid digest '{value}': expected 64 lowercase hex characters"
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x`-prefixed form used for ledger submission
    pub fn prefixed(&self) -> String {
        format!("0x{}", self.0)
    }

    fn from_hash(hash: impl AsRef<[u8]>) -> Self {
        Digest(hex::encode(hash))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Digest::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Hash a file's contents, streaming in 8KB chunks
pub async fn hash_file(path: &Path) -> Result<Digest, AuditError> {
    use tokio::io::AsyncReadExt;

    let not_found = |source| AuditError::ArtifactNotFound {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(not_found)?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).await.map_err(not_found)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Digest::from_hash(hasher.finalize()))
}

/// Hash a file's contents synchronously (for non-async contexts)
pub fn hash_file_sync(path: &Path) -> Result<Digest, AuditError> {
    let not_found = |source| AuditError::ArtifactNotFound {
        path: path.to_path_buf(),
        source,
    };

    let mut file = std::fs::File::open(path).map_err(not_found)?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(not_found)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Digest::from_hash(hasher.finalize()))
}

/// Hash an in-memory byte slice
pub fn hash_bytes(content: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(content);
    Digest::from_hash(hasher.finalize())
}

/// Hash several files concurrently, preserving input order
pub async fn hash_files(paths: &[PathBuf]) -> Vec<(PathBuf, Result<Digest, AuditError>)> {
    let futures = paths
        .iter()
        .map(|path| async move { (path.clone(), hash_file(path).await) });
    futures::future::join_all(futures).await
}
