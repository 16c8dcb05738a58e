//! Duplicate path detection.
//!
//! Dedups *paths*, not content: a file reached through several symlink
//! chains resolves to one canonical path and is visited once.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("path was already registered")]
pub struct AlreadySeen;

/// Set of BLAKE3 fingerprints of canonical path strings.
#[derive(Debug, Default)]
pub struct DupeDetector {
    seen: HashSet<[u8; 32]>,
}

impl DupeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `canonical` as seen. Fails if it was registered before.
    pub fn register(&mut self, canonical: &Path) -> Result<(), AlreadySeen> {
        let fingerprint = fingerprint(canonical);
        if self.seen.insert(fingerprint) {
            Ok(())
        } else {
            Err(AlreadySeen)
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(unix)]
fn fingerprint(path: &Path) -> [u8; 32] {
    use std::os::unix::ffi::OsStrExt;
    *blake3::hash(path.as_os_str().as_bytes()).as_bytes()
}

#[cfg(not(unix))]
fn fingerprint(path: &Path) -> [u8; 32] {
    *blake3::hash(path.to_string_lossy().as_bytes()).as_bytes()
}
