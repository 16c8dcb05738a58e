//! Recursive directory walker.
//!
//! `walk` hands every qualifying file below a directory to a visitor exactly
//! once. Along the way it applies:
//!
//! - the [`SymlinkPolicy`], with a hard ceiling on nested directory symlinks
//! - duplicate path detection through an optional [`DupeDetector`]
//! - an optional byte [`Quota`]
//! - the soft error policy for stat and directory read failures
//!
//! No order is promised between the entries of one directory.

use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::dupes::DupeDetector;
use crate::policy::ErrorPolicy;
use crate::WalkError;

/// Nested directory symlinks followed before giving up.
pub const MAX_SYMLINK_DEPTH: usize = 40;

// ============================================================================
// Walk state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymlinkPolicy {
    /// Never follow symlinks.
    RejectAll,
    /// Follow symlinks to files, not to directories.
    #[default]
    RejectDirs,
    /// Follow every symlink.
    FollowAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaMode {
    /// Stop the whole run at the first file that exceeds the quota.
    Cutoff,
    /// Skip files that exceed the quota, keep walking.
    Skip,
}

/// Byte budget for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub mode: QuotaMode,
    pub remaining: i64,
}

impl Quota {
    pub fn new(mode: QuotaMode, bytes: u64) -> Self {
        Self {
            mode,
            remaining: i64::try_from(bytes).unwrap_or(i64::MAX),
        }
    }
}

/// Non-error control signal returned by visitors and the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Skip the remaining entries of the current directory.
    SkipDir,
    /// Stop the entire traversal. Not an error.
    SkipAll,
}

/// How a file reached the visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Named directly by the user.
    Root,
    /// Discovered while walking a directory.
    Walked,
}

/// A file handed to the visitor.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: OsString,
    pub size: u64,
    pub regular: bool,
    pub origin: Origin,
}

impl FileEntry {
    pub fn from_metadata(name: OsString, meta: &Metadata, origin: Origin) -> Self {
        Self {
            name,
            size: meta.len(),
            regular: meta.is_file(),
            origin,
        }
    }

    pub fn path(&self, parent: &Path) -> PathBuf {
        parent.join(&self.name)
    }
}

/// Traversal state shared by every root of one invocation.
///
/// Only the walking thread touches it. The symlink depth is the only field
/// that goes up and down during recursion.
#[derive(Debug, Default)]
pub struct WalkContext {
    pub symlinks: SymlinkPolicy,
    pub dupes: Option<DupeDetector>,
    pub quota: Option<Quota>,
    symlink_depth: usize,
}

impl WalkContext {
    pub fn new(symlinks: SymlinkPolicy) -> Self {
        Self {
            symlinks,
            ..Default::default()
        }
    }

    pub fn with_dupe_detection(mut self) -> Self {
        self.dupes = Some(DupeDetector::new());
        self
    }

    pub fn with_quota(mut self, quota: Quota) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn symlink_depth(&self) -> usize {
        self.symlink_depth
    }
}

// ============================================================================
// Walking
// ============================================================================

/// Walk the directory at `path`, calling `visit(parent, entry, ctx)` for each
/// qualifying file.
///
/// Soft failures go through `policy`; hard failures and errors returned by
/// `visit` abort the walk. `Flow::SkipAll` from anywhere below is returned
/// as is so the caller can stop further roots too.
pub fn walk<F, E>(
    path: &Path,
    ctx: &mut WalkContext,
    policy: &ErrorPolicy,
    visit: &mut F,
) -> Result<Flow, E>
where
    F: FnMut(&Path, &FileEntry, &WalkContext) -> Result<Flow, E>,
    E: From<WalkError>,
{
    walk_at(path, path, ctx, policy, visit)
}

/// `dir` is the path handed to the visitor, `real` the one the filesystem
/// is queried through. Below a followed directory symlink `real` continues
/// from the link's canonical target.
fn walk_at<F, E>(
    dir: &Path,
    real: &Path,
    ctx: &mut WalkContext,
    policy: &ErrorPolicy,
    visit: &mut F,
) -> Result<Flow, E>
where
    F: FnMut(&Path, &FileEntry, &WalkContext) -> Result<Flow, E>,
    E: From<WalkError>,
{
    let meta = match fs::symlink_metadata(real) {
        Ok(meta) => meta,
        Err(e) => {
            policy.consume(WalkError::io(dir, e))?;
            return Ok(Flow::Continue);
        }
    };
    let file_type = meta.file_type();
    if !file_type.is_dir() && !file_type.is_symlink() {
        return Err(WalkError::NotADirectory {
            path: dir.to_path_buf(),
        }
        .into());
    }
    if !file_type.is_symlink() {
        return walk_entries(dir, real, ctx, policy, visit);
    }

    if ctx.symlinks != SymlinkPolicy::FollowAll {
        info!(path = %dir.display(), "Skipping directory symlink");
        return Ok(Flow::Continue);
    }
    if ctx.symlink_depth >= MAX_SYMLINK_DEPTH {
        return Err(WalkError::SymlinkLimitExceeded {
            path: dir.to_path_buf(),
            limit: MAX_SYMLINK_DEPTH,
        }
        .into());
    }
    let target = match fs::canonicalize(real) {
        Ok(target) => target,
        Err(e) => {
            policy.consume(WalkError::io(dir, e))?;
            return Ok(Flow::Continue);
        }
    };
    ctx.symlink_depth += 1;
    debug!(path = %dir.display(), target = %target.display(), depth = ctx.symlink_depth, "Entering directory symlink");
    let result = walk_entries(dir, &target, ctx, policy, visit);
    ctx.symlink_depth -= 1;
    result
}

fn walk_entries<F, E>(
    dir: &Path,
    real: &Path,
    ctx: &mut WalkContext,
    policy: &ErrorPolicy,
    visit: &mut F,
) -> Result<Flow, E>
where
    F: FnMut(&Path, &FileEntry, &WalkContext) -> Result<Flow, E>,
    E: From<WalkError>,
{
    let (entries, errors) = read_entries(dir, real);
    consume_batch(policy, errors)?;

    for entry in entries {
        let path = dir.join(entry.file_name());
        let real_path = entry.path();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                policy.consume(WalkError::io(&path, e))?;
                continue;
            }
        };

        let candidate = if file_type.is_dir() {
            None
        } else if file_type.is_symlink() {
            if ctx.symlinks == SymlinkPolicy::RejectAll {
                debug!(path = %path.display(), "Skipping symlink");
                continue;
            }
            // Resolve the target to tell directory links from file links.
            match fs::metadata(&real_path) {
                Ok(target) if target.is_dir() => None,
                Ok(target) if target.is_file() => {
                    Some(FileEntry::from_metadata(entry.file_name(), &target, Origin::Walked))
                }
                Ok(_) => {
                    debug!(path = %path.display(), "Skipping symlink to special file");
                    continue;
                }
                Err(e) => {
                    policy.consume(WalkError::io(&path, e))?;
                    continue;
                }
            }
        } else if file_type.is_file() {
            match entry.metadata() {
                Ok(meta) => Some(FileEntry::from_metadata(entry.file_name(), &meta, Origin::Walked)),
                Err(e) => {
                    policy.consume(WalkError::io(&path, e))?;
                    continue;
                }
            }
        } else {
            debug!(path = %path.display(), "Skipping special file");
            continue;
        };

        let flow = match candidate {
            None => walk_at(&path, &real_path, ctx, policy, visit)?,
            Some(file) => match examine(dir, &file, &real_path, ctx, policy, visit)? {
                Flow::SkipDir => {
                    debug!(path = %dir.display(), "Skipping rest of directory");
                    return Ok(Flow::Continue);
                }
                flow => flow,
            },
        };
        if flow == Flow::SkipAll {
            return Ok(Flow::SkipAll);
        }
    }
    Ok(Flow::Continue)
}

/// Route the failures of one directory read through `policy`.
///
/// All but the last error are only logged; the last one decides whether
/// the walk goes on.
fn consume_batch(policy: &ErrorPolicy, mut errors: Vec<WalkError>) -> Result<(), WalkError> {
    if let Some(last) = errors.pop() {
        for err in &errors {
            policy.log(err);
        }
        policy.consume(last)?;
    }
    Ok(())
}

/// Read all entries of `real`, collecting per-entry failures separately.
/// Failures are reported against `dir`.
fn read_entries(dir: &Path, real: &Path) -> (Vec<fs::DirEntry>, Vec<WalkError>) {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    match fs::read_dir(real) {
        Ok(iter) => {
            for entry in iter {
                match entry {
                    Ok(entry) => entries.push(entry),
                    Err(e) => errors.push(WalkError::io(dir, e)),
                }
            }
        }
        Err(e) => errors.push(WalkError::io(dir, e)),
    }
    (entries, errors)
}

/// Apply duplicate detection and the quota to one file, then visit it.
///
/// Used by the driver for files named directly. A `Flow::SkipDir` from the
/// visitor is meaningless here and becomes `Flow::Continue`.
pub fn examine_file<F, E>(
    parent: &Path,
    file: &FileEntry,
    ctx: &mut WalkContext,
    policy: &ErrorPolicy,
    visit: &mut F,
) -> Result<Flow, E>
where
    F: FnMut(&Path, &FileEntry, &WalkContext) -> Result<Flow, E>,
    E: From<WalkError>,
{
    match examine(parent, file, &file.path(parent), ctx, policy, visit)? {
        Flow::SkipDir => Ok(Flow::Continue),
        flow => Ok(flow),
    }
}

fn examine<F, E>(
    parent: &Path,
    file: &FileEntry,
    real: &Path,
    ctx: &mut WalkContext,
    policy: &ErrorPolicy,
    visit: &mut F,
) -> Result<Flow, E>
where
    F: FnMut(&Path, &FileEntry, &WalkContext) -> Result<Flow, E>,
    E: From<WalkError>,
{
    let path = file.path(parent);

    if let Some(dupes) = ctx.dupes.as_mut() {
        let real = match fs::canonicalize(real) {
            Ok(real) => real,
            Err(e) => {
                policy.consume(WalkError::io(&path, e))?;
                return Ok(Flow::Continue);
            }
        };
        if dupes.register(&real).is_err() {
            debug!(path = %path.display(), "Already processed, skipping");
            return Ok(Flow::Continue);
        }
    }

    if let Some(quota) = ctx.quota.as_mut() {
        if file.regular {
            quota.remaining -= i64::try_from(file.size).unwrap_or(i64::MAX);
            if quota.remaining < 0 {
                match quota.mode {
                    QuotaMode::Cutoff => {
                        info!(path = %path.display(), "Quota exceeded, stopping");
                        return Ok(Flow::SkipAll);
                    }
                    QuotaMode::Skip => {
                        info!(path = %path.display(), "Quota exceeded, skipping file");
                        return Ok(Flow::Continue);
                    }
                }
            }
        }
    }

    visit(parent, file, ctx)
}
