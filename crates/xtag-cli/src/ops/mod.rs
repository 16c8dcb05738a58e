//! Per-file operations.
//!
//! Every operation follows the same shape: open the file, load its
//! attribute, act on it, store it back if anything changed and optionally
//! echo the path.

mod print;
mod tag;
mod untag;
mod validate;

use std::fs::File;
use std::path::Path;

use tracing::debug;
use xtag_record::MetadataStore;
use xtag_walk::{ErrorPolicy, Origin};

use crate::error::{Result, XtagError};
use crate::output::Printer;
use crate::settings::{Command, RunConfig};

pub use validate::Recheck;

/// Everything a file operation needs, shared by reference with workers.
pub struct Program<'a> {
    pub cfg: &'a RunConfig,
    pub store: &'a dyn MetadataStore,
    pub printer: &'a Printer,
    pub policy: &'a ErrorPolicy,
}

impl Program<'_> {
    /// Run the configured command on one file.
    ///
    /// Soft errors are routed through the error policy here, so only errors
    /// that must abort the run are returned.
    pub fn apply(&self, path: &Path, origin: Origin) -> Result<()> {
        let result = match &self.cfg.command {
            Command::Tag { name, only } => tag::tag_file(self, path, name, *only),
            Command::Untag { names, only } => untag::untag_file(self, path, names.as_deref(), *only),
            Command::Print {
                names,
                only,
                records,
            } => print::print_file(self, path, names.as_deref(), *only, *records),
            Command::Invalidate { names } => {
                validate::recheck_file(self, path, names.as_deref(), Recheck::Invalidate)
            }
            Command::Revalidate { names, allow } => {
                if !*allow {
                    debug!(path = %path.display(), "Revalidation not allowed, leaving file untouched");
                    return Ok(());
                }
                validate::recheck_file(self, path, names.as_deref(), Recheck::Revalidate)
            }
        };
        match result {
            Err(err) if err.is_soft(origin) => self.policy.consume(err),
            other => other,
        }
    }

    /// Echo the path of a modified file when NUL output is requested.
    fn echo_changed(&self, path: &Path) -> Result<()> {
        if self.cfg.print0 {
            self.printer.null(path).map_err(XtagError::Output)?;
        }
        Ok(())
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| XtagError::io(path, e))
}
