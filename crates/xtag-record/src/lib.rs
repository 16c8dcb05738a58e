//! # xtag-record
//!
//! Integrity records kept in a file's inode metadata, independent of the
//! file's content.
//!
//! ## Layout
//!
//! ```text
//! user.xtagger = {"<name>": {"c": <hex checksum>, "h": <algorithm>, "t": <unix time>, "v": <valid>}, ...}
//! ```
//!
//! The whole [`Attribute`] is re-serialized and written back after every
//! mutation; there is no partial update of the stored blob.

pub mod hashing;
pub mod record;
pub mod store;

pub use hashing::{digest_hex, hash, hash_hex, multi_hash, Accumulator, Algorithm, BUF_SIZE};
pub use record::{validate_name, Attribute, Record, ValidationError};
pub use store::{MemoryStore, MetadataStore, XattrStore, ATTR_NAME};

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading or storing records
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: corrupt record data: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("{path}: refusing to store record \"{name}\": {source}")]
    Invalid {
        path: PathBuf,
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("{path}: failed to encode records: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RecordError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        RecordError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            RecordError::Io { path, .. }
            | RecordError::Corrupt { path, .. }
            | RecordError::Invalid { path, .. }
            | RecordError::Encode { path, .. } => path,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecordError>;

/// Load the attribute of an open file.
///
/// A file without a blob yields an empty attribute. A blob that fails to
/// decode or holds an invalid record is a [`RecordError::Corrupt`].
pub fn load(store: &dyn MetadataStore, file: &File, path: &Path) -> Result<Attribute> {
    let Some(blob) = store.read(file, path).map_err(|e| RecordError::io(path, e))? else {
        return Ok(Attribute::new());
    };
    decode(&blob, path)
}

/// Open `path` read-only and load its attribute.
pub fn load_path(store: &dyn MetadataStore, path: &Path) -> Result<Attribute> {
    let file = File::open(path).map_err(|e| RecordError::io(path, e))?;
    load(store, &file, path)
}

/// Decode a raw blob, validating every record.
pub fn decode(blob: &[u8], path: &Path) -> Result<Attribute> {
    let attr: Attribute = serde_json::from_slice(blob).map_err(|e| RecordError::Corrupt {
        path: path.to_path_buf(),
        reason: format!("failed to decode json: {}", e),
    })?;
    attr.validate().map_err(|(name, e)| RecordError::Corrupt {
        path: path.to_path_buf(),
        reason: format!("validation for record \"{}\" failed: {}", name, e),
    })?;
    Ok(attr)
}

impl Attribute {
    /// Validate, serialize and write the attribute in one store call.
    pub fn store(&self, store: &dyn MetadataStore, file: &File, path: &Path) -> Result<()> {
        self.validate().map_err(|(name, source)| RecordError::Invalid {
            path: path.to_path_buf(),
            name,
            source,
        })?;
        let payload = serde_json::to_vec(self).map_err(|source| RecordError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        store
            .write(file, path, &payload)
            .map_err(|e| RecordError::io(path, e))?;
        debug!(path = %path.display(), records = self.len(), backend = store.name(), "Stored records");
        Ok(())
    }

    /// Open `path` read-only and store the attribute on it.
    pub fn store_path(&self, store: &dyn MetadataStore, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| RecordError::io(path, e))?;
        self.store(store, &file, path)
    }
}

/// Remove the metadata blob entirely. Removing an absent blob is a no-op.
///
/// Returns whether a blob was removed.
pub fn purge(store: &dyn MetadataStore, file: &File, path: &Path) -> Result<bool> {
    let removed = store.remove(file, path).map_err(|e| RecordError::io(path, e))?;
    debug!(path = %path.display(), removed, "Purged records");
    Ok(removed)
}
