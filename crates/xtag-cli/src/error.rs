use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use xtag_config::ConfigError;
use xtag_record::RecordError;
use xtag_walk::{DispatchError, Origin, WalkError};

#[derive(Error, Debug)]
pub enum XtagError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Record \"{name}\" already exists for path \"{path}\"")]
    NameConflict { name: String, path: PathBuf },

    #[error("Recursion is forbidden, cannot descend into directory {path}")]
    RecursionForbidden { path: PathBuf },

    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),

    #[error("Invalid configuration: {0}")]
    Usage(String),
}

impl XtagError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        XtagError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the error may be skipped under the default error policy.
    ///
    /// Corrupt record data is skipped while walking but aborts the run for a
    /// path the user named directly.
    pub fn is_soft(&self, origin: Origin) -> bool {
        match self {
            XtagError::Record(RecordError::Io { .. }) => true,
            XtagError::Record(RecordError::Corrupt { .. }) => origin == Origin::Walked,
            XtagError::Record(_) => false,
            XtagError::Walk(e) => e.is_soft(),
            XtagError::Io { .. } | XtagError::NameConflict { .. } | XtagError::Output(_) => true,
            XtagError::Dispatch(_)
            | XtagError::Config(_)
            | XtagError::RecursionForbidden { .. }
            | XtagError::Usage(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, XtagError>;
