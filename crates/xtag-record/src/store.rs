//! Metadata store backends.
//!
//! The record model treats the per-file metadata slot as an opaque
//! key-value entry. Upper layers use [`MetadataStore`] without knowing where
//! the blob actually lives:
//!
//! - [`XattrStore`]: the blob is an extended attribute on the file's inode
//! - [`MemoryStore`]: the blob lives in a process-local map keyed by inode

use std::fs::{File, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use dashmap::DashMap;
use xattr::FileExt;

/// Reserved extended attribute holding the serialized records.
pub const ATTR_NAME: &str = "user.xtagger";

/// Backend for the per-file metadata blob.
///
/// Implementations operate on an already opened file so the caller can
/// load, hash and store through one descriptor.
pub trait MetadataStore: Send + Sync {
    /// Read the blob. `Ok(None)` means the file has no blob yet.
    fn read(&self, file: &File, path: &Path) -> io::Result<Option<Vec<u8>>>;

    /// Replace the blob in a single write.
    fn write(&self, file: &File, path: &Path, blob: &[u8]) -> io::Result<()>;

    /// Remove the blob. Returns false if there was nothing to remove.
    fn remove(&self, file: &File, path: &Path) -> io::Result<bool>;

    /// Backend name for logging/debugging
    fn name(&self) -> &'static str;
}

// ============================================================================
// Extended attributes
// ============================================================================

/// Stores the blob as the `user.xtagger` extended attribute.
#[derive(Debug, Clone, Default)]
pub struct XattrStore;

impl XattrStore {
    pub fn new() -> Self {
        Self
    }

    /// Whether this platform has extended attribute support at all.
    pub fn is_supported() -> bool {
        xattr::SUPPORTED_PLATFORM
    }
}

impl MetadataStore for XattrStore {
    fn read(&self, file: &File, _path: &Path) -> io::Result<Option<Vec<u8>>> {
        file.get_xattr(ATTR_NAME)
    }

    fn write(&self, file: &File, _path: &Path, blob: &[u8]) -> io::Result<()> {
        file.set_xattr(ATTR_NAME, blob)
    }

    fn remove(&self, file: &File, _path: &Path) -> io::Result<bool> {
        // Removing a missing attribute fails with a platform-specific errno,
        // so check the listing first.
        let present = file.list_xattr()?.any(|name| name == ATTR_NAME);
        if present {
            file.remove_xattr(ATTR_NAME)?;
        }
        Ok(present)
    }

    fn name(&self) -> &'static str {
        "xattr"
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Device and inode number of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    fn of(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
}

/// Keeps blobs in memory, keyed by the inode of the opened file.
///
/// Like an extended attribute, a blob belongs to the file itself, so every
/// path leading to the same inode sees the same blob.
/// Used by tests and for dry runs where the filesystem must not be touched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<FileId, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw access to the blob of the file at `path`, following symlinks.
    pub fn blob(&self, path: &Path) -> Option<Vec<u8>> {
        let id = FileId::of(&std::fs::metadata(path).ok()?);
        self.blobs.get(&id).map(|b| b.value().clone())
    }

    /// Plant a raw blob on the file at `path`, bypassing validation.
    pub fn set_blob(&self, path: &Path, blob: impl Into<Vec<u8>>) -> io::Result<()> {
        let id = FileId::of(&std::fs::metadata(path)?);
        self.blobs.insert(id, blob.into());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl MetadataStore for MemoryStore {
    fn read(&self, file: &File, _path: &Path) -> io::Result<Option<Vec<u8>>> {
        let id = FileId::of(&file.metadata()?);
        Ok(self.blobs.get(&id).map(|b| b.value().clone()))
    }

    fn write(&self, file: &File, _path: &Path, blob: &[u8]) -> io::Result<()> {
        let id = FileId::of(&file.metadata()?);
        self.blobs.insert(id, blob.to_vec());
        Ok(())
    }

    fn remove(&self, file: &File, _path: &Path) -> io::Result<bool> {
        let id = FileId::of(&file.metadata()?);
        Ok(self.blobs.remove(&id).is_some())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        let file = File::open(&path).unwrap();

        let store = MemoryStore::new();
        assert_eq!(store.read(&file, &path).unwrap(), None);
        store.write(&file, &path, b"{}").unwrap();
        assert_eq!(store.read(&file, &path).unwrap(), Some(b"{}".to_vec()));
        assert!(store.remove(&file, &path).unwrap());
        assert!(!store.remove(&file, &path).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_follows_the_inode() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("real");
        let link = temp.path().join("link");
        std::fs::write(&real, b"x").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let store = MemoryStore::new();
        let via_link = File::open(&link).unwrap();
        store.write(&via_link, &link, b"{}").unwrap();

        let direct = File::open(&real).unwrap();
        assert_eq!(store.read(&direct, &real).unwrap(), Some(b"{}".to_vec()));
        assert_eq!(store.blob(&real), Some(b"{}".to_vec()));
        assert_eq!(store.len(), 1);

        store.set_blob(&link, "null").unwrap();
        assert_eq!(store.read(&direct, &real).unwrap(), Some(b"null".to_vec()));
        assert!(store.remove(&direct, &real).unwrap());
        assert_eq!(store.blob(&link), None);
    }

    #[test]
    fn test_xattr_store_remove_missing_is_noop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        let file = File::open(&path).unwrap();

        let store = XattrStore::new();
        match store.write(&file, &path, b"{}") {
            Ok(()) => {
                assert!(store.remove(&file, &path).unwrap());
                assert!(!store.remove(&file, &path).unwrap());
                assert_eq!(store.read(&file, &path).unwrap(), None);
            }
            Err(e) => {
                // tmpfs/overlay without user xattrs, or an unsupported platform
                println!("Skipping xattr test (not supported here): {}", e);
            }
        }
    }
}
