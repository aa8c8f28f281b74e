//! SHA-256 content hashing shared by signatures and evidence.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a file's contents, or `None` if it does not exist.
pub fn file_sha256(path: &Path) -> Result<Option<String>> {
    match fs::read(path) {
        Ok(contents) => Ok(Some(sha256_hex(&contents))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}
