//! # xtag-walk
//!
//! Traversal engine for xtag: a recursive directory walker that hands each
//! qualifying file to a callback exactly once, and a dispatcher that can fan
//! those callbacks out onto a worker pool.
//!
//! ## Modules
//!
//! - [`walker`]: symlink policy, symlink depth ceiling, byte quota
//! - [`dupes`]: path fingerprints so a file reached twice is visited once
//! - [`dispatch`]: rayon worker pool with a single error collector
//! - [`policy`]: soft error handling (log and continue, or stop)

pub mod dispatch;
pub mod dupes;
pub mod policy;
pub mod walker;

pub use dispatch::{Dispatched, Dispatcher, Scheduler};
pub use dupes::{AlreadySeen, DupeDetector};
pub use policy::{ErrorMode, ErrorPolicy};
pub use walker::{
    examine_file, walk, FileEntry, Flow, Origin, Quota, QuotaMode, SymlinkPolicy, WalkContext,
    MAX_SYMLINK_DEPTH,
};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by the walker itself
#[derive(Error, Debug)]
pub enum WalkError {
    /// Stat, directory read or path resolution failure. Soft.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("{path}: symlink limit of {limit} reached")]
    SymlinkLimitExceeded { path: PathBuf, limit: usize },
}

impl WalkError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        WalkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the error is per-entry and may be skipped under the default policy.
    pub fn is_soft(&self) -> bool {
        matches!(self, WalkError::Io { .. })
    }
}

/// Errors raised while setting up the dispatcher
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to spawn error collector: {0}")]
    Collector(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, WalkError>;
