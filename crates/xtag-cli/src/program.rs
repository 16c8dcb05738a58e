//! Run driver: walks every root and applies the command to each file, either
//! inline or on the worker pool.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use xtag_config::{log_cli_debug, log_cli_warn};
use xtag_record::MetadataStore;
use xtag_walk::{
    examine_file, walk, Dispatcher, ErrorPolicy, FileEntry, Flow, Origin, WalkContext,
};

use crate::error::{Result, XtagError};
use crate::ops::Program;
use crate::output::Printer;
use crate::settings::{Command, RunConfig};

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    HardFailure = 1,
    /// Completed, but at least one soft error was skipped.
    SoftErrors = 2,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub soft_errors: usize,
    /// Jobs that failed on the worker pool.
    pub worker_errors: usize,
}

impl Outcome {
    pub fn status(&self) -> ExitStatus {
        if self.worker_errors > 0 {
            ExitStatus::HardFailure
        } else if self.soft_errors > 0 {
            ExitStatus::SoftErrors
        } else {
            ExitStatus::Success
        }
    }
}

/// One file handed to a worker.
#[derive(Debug)]
pub struct Job {
    pub path: PathBuf,
    pub origin: Origin,
}

/// Run `cfg` against `store`, writing output to `printer`.
///
/// Hard errors abort the run and are returned. Soft errors are counted in
/// the returned [`Outcome`].
pub fn run(cfg: &RunConfig, store: &dyn MetadataStore, printer: &Printer) -> Result<Outcome> {
    if let Command::Revalidate { allow: false, .. } = cfg.command {
        log_cli_warn!("Revalidation requires --allow-revalidation, nothing done");
        return Ok(Outcome::default());
    }

    let policy = ErrorPolicy::new(cfg.error_mode);
    let program = Program {
        cfg,
        store,
        printer,
        policy: &policy,
    };

    let mut ctx = WalkContext::new(cfg.symlinks);
    if cfg.command.mutates() {
        ctx = ctx.with_dupe_detection();
    }
    if let Some(quota) = cfg.quota {
        ctx = ctx.with_quota(quota);
    }

    let mut worker_errors = 0;
    if cfg.multithread {
        let dispatcher = Dispatcher::new(cfg.threads)?;
        log_cli_debug!(
            "Dispatching to worker pool",
            threads = dispatcher.threads(),
            command = cfg.command.name()
        );
        let report = dispatcher.run(
            |job: Job| program.apply(&job.path, job.origin),
            |scheduler| {
                drive(
                    cfg,
                    &mut ctx,
                    &policy,
                    &mut |parent: &Path, file: &FileEntry, _: &WalkContext| {
                        Ok(scheduler.schedule(Job {
                            path: file.path(parent),
                            origin: file.origin,
                        }))
                    },
                )
            },
        )?;
        report.value?;
        worker_errors = report.errors.len();
        debug!(scheduled = report.scheduled, failed = worker_errors, "Worker pool drained");
    } else {
        drive(
            cfg,
            &mut ctx,
            &policy,
            &mut |parent: &Path, file: &FileEntry, _: &WalkContext| {
                program.apply(&file.path(parent), file.origin)?;
                Ok(Flow::Continue)
            },
        )?;
    }

    printer.flush().map_err(XtagError::Output)?;
    Ok(Outcome {
        soft_errors: policy.soft_count(),
        worker_errors,
    })
}

/// Feed every root to the walker, or straight to `visit` for files.
fn drive<F>(
    cfg: &RunConfig,
    ctx: &mut WalkContext,
    policy: &ErrorPolicy,
    visit: &mut F,
) -> Result<Flow>
where
    F: FnMut(&Path, &FileEntry, &WalkContext) -> Result<Flow>,
{
    for path in &cfg.paths {
        let flow = drive_root(path, cfg, ctx, policy, visit)?;
        if flow == Flow::SkipAll {
            debug!(path = %path.display(), "Traversal stopped early");
            return Ok(Flow::SkipAll);
        }
    }
    Ok(Flow::Continue)
}

fn drive_root<F>(
    path: &Path,
    cfg: &RunConfig,
    ctx: &mut WalkContext,
    policy: &ErrorPolicy,
    visit: &mut F,
) -> Result<Flow>
where
    F: FnMut(&Path, &FileEntry, &WalkContext) -> Result<Flow>,
{
    let link_meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            policy.consume(XtagError::io(path, e))?;
            return Ok(Flow::Continue);
        }
    };
    let is_link = link_meta.file_type().is_symlink();
    let target = if is_link {
        match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                policy.consume(XtagError::io(path, e))?;
                return Ok(Flow::Continue);
            }
        }
    } else {
        link_meta
    };

    if target.is_dir() {
        if cfg.forbid_recursion {
            return Err(XtagError::RecursionForbidden {
                path: path.to_path_buf(),
            });
        }
        return walk(path, ctx, policy, visit);
    }
    if !target.is_file() {
        debug!(path = %path.display(), "Skipping special file");
        return Ok(Flow::Continue);
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let name = path.file_name().unwrap_or(path.as_os_str());
    let file = FileEntry::from_metadata(name.to_os_string(), &target, Origin::Root);
    examine_file(parent, &file, ctx, policy, visit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::tests::{record, tag, EMPTY_SHA256};
    use crate::output::SharedBuffer;
    use crate::settings::{PrintConstraint, UntagConstraint};
    use tempfile::TempDir;
    use xtag_record::{load_path, Attribute, MemoryStore};
    use xtag_walk::{ErrorMode, Quota, QuotaMode, SymlinkPolicy};

    struct Fixture {
        temp: TempDir,
        store: MemoryStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
                store: MemoryStore::new(),
            }
        }

        fn file(&self, rel: &str, content: &[u8]) -> PathBuf {
            let path = self.temp.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            path
        }

        fn root(&self) -> PathBuf {
            self.temp.path().to_path_buf()
        }

        fn config(&self, command: Command) -> RunConfig {
            RunConfig::new(command, vec![self.root()])
        }

        fn run(&self, cfg: &RunConfig) -> (Result<Outcome>, String) {
            let out = SharedBuffer::new();
            let printer = Printer::new(out.clone());
            let result = run(cfg, &self.store, &printer);
            (result, out.text())
        }

        fn tagged(&self, path: &Path, name: &str) -> bool {
            load_path(&self.store, path).unwrap().contains(name)
        }
    }

    fn print_all() -> Command {
        Command::Print {
            names: None,
            only: PrintConstraint::None,
            records: false,
        }
    }

    fn sorted_lines(text: &str) -> Vec<String> {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        lines.sort();
        lines
    }

    #[test]
    fn test_tag_tree_then_print() {
        let fx = Fixture::new();
        let a = fx.file("a.txt", b"a");
        let b = fx.file("sub/b.txt", b"b");
        let c = fx.file("sub/deeper/c.txt", b"");

        let (result, _) = fx.run(&fx.config(tag("v1")));
        assert_eq!(result.unwrap().status(), ExitStatus::Success);
        for path in [&a, &b, &c] {
            assert!(fx.tagged(path, "v1"), "{} not tagged", path.display());
        }
        let rec = load_path(&fx.store, &c).unwrap();
        assert_eq!(rec.get("v1").unwrap().checksum, EMPTY_SHA256);

        let (result, out) = fx.run(&fx.config(print_all()));
        assert_eq!(result.unwrap(), Outcome::default());
        let mut expected: Vec<String> = [&a, &b, &c]
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        expected.sort();
        assert_eq!(sorted_lines(&out), expected);
    }

    #[test]
    fn test_multithreaded_tag() {
        let fx = Fixture::new();
        let files: Vec<PathBuf> = (0..64)
            .map(|i| fx.file(&format!("d{}/f{}", i % 4, i), &[i as u8; 32]))
            .collect();

        let mut cfg = fx.config(tag("mt"));
        cfg.multithread = true;
        cfg.threads = Some(4);
        let (result, _) = fx.run(&cfg);
        assert_eq!(result.unwrap().status(), ExitStatus::Success);
        for path in &files {
            assert!(fx.tagged(path, "mt"));
        }
    }

    #[test]
    fn test_multithreaded_hard_failure() {
        let fx = Fixture::new();
        let path = fx.file("f", b"x");
        let mut attr = Attribute::new();
        attr.insert("v1", record(EMPTY_SHA256, true));
        attr.store_path(&fx.store, &path).unwrap();

        let mut cfg = fx.config(tag("v1"));
        cfg.multithread = true;
        cfg.error_mode = ErrorMode::StopOnSoftError;
        let (result, _) = fx.run(&cfg);
        let outcome = result.unwrap();
        assert_eq!(outcome.worker_errors, 1);
        assert_eq!(outcome.status(), ExitStatus::HardFailure);
    }

    #[test]
    fn test_name_conflict_gives_soft_status() {
        let fx = Fixture::new();
        fx.file("a", b"1");
        fx.file("b", b"2");
        let cfg = fx.config(tag("v1"));
        fx.run(&cfg).0.unwrap();

        let (result, _) = fx.run(&cfg);
        let outcome = result.unwrap();
        assert_eq!(outcome.soft_errors, 2);
        assert_eq!(outcome.status(), ExitStatus::SoftErrors);

        let mut strict = cfg.clone();
        strict.error_mode = ErrorMode::StopOnSoftError;
        let (result, _) = fx.run(&strict);
        assert!(matches!(result, Err(XtagError::NameConflict { .. })));
    }

    #[test]
    fn test_recursion_forbidden_is_hard() {
        let fx = Fixture::new();
        let file = fx.file("top.txt", b"top");
        let mut cfg = fx.config(tag("v1"));
        cfg.forbid_recursion = true;

        let (result, _) = fx.run(&cfg);
        assert!(matches!(result, Err(XtagError::RecursionForbidden { .. })));

        // Files named directly are still fine.
        cfg.paths = vec![file.clone()];
        fx.run(&cfg).0.unwrap();
        assert!(fx.tagged(&file, "v1"));
    }

    #[test]
    fn test_missing_root_is_soft() {
        let fx = Fixture::new();
        let present = fx.file("present", b"");
        let mut cfg = fx.config(tag("v1"));
        cfg.paths = vec![fx.root().join("absent"), present.clone()];

        let outcome = fx.run(&cfg).0.unwrap();
        assert_eq!(outcome.soft_errors, 1);
        assert!(fx.tagged(&present, "v1"));
    }

    #[test]
    fn test_corrupt_root_is_hard_but_walked_is_soft() {
        let fx = Fixture::new();
        let bad = fx.file("bad", b"");
        fx.file("good", b"");
        fx.store.set_blob(&bad, "not json").unwrap();

        let outcome = fx.run(&fx.config(print_all())).0.unwrap();
        assert_eq!(outcome.soft_errors, 1);

        let mut cfg = fx.config(print_all());
        cfg.paths = vec![bad];
        assert!(matches!(
            fx.run(&cfg).0,
            Err(XtagError::Record(xtag_record::RecordError::Corrupt { .. }))
        ));
    }

    #[test]
    fn test_revalidate_requires_permission() {
        let fx = Fixture::new();
        let path = fx.file("f", b"");
        let mut attr = Attribute::new();
        attr.insert("v1", record(EMPTY_SHA256, false));
        attr.store_path(&fx.store, &path).unwrap();

        let mut cfg = fx.config(Command::Revalidate {
            names: None,
            allow: false,
        });
        assert_eq!(fx.run(&cfg).0.unwrap().status(), ExitStatus::Success);
        assert!(!load_path(&fx.store, &path).unwrap().get("v1").unwrap().valid);

        cfg.command = Command::Revalidate {
            names: None,
            allow: true,
        };
        cfg.print0 = true;
        let (result, out) = fx.run(&cfg);
        result.unwrap();
        assert!(load_path(&fx.store, &path).unwrap().get("v1").unwrap().valid);
        assert_eq!(out, format!("{}\0", path.display()));
    }

    #[test]
    fn test_quota_cutoff_stops_run() {
        let fx = Fixture::new();
        for i in 0..10 {
            fx.file(&format!("f{}", i), &[0u8; 100]);
        }
        let mut cfg = fx.config(tag("q"));
        cfg.quota = Some(Quota::new(QuotaMode::Cutoff, 350));
        fx.run(&cfg).0.unwrap();

        let (_, out) = fx.run(&fx.config(Command::Print {
            names: None,
            only: PrintConstraint::None,
            records: false,
        }));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_quota_skip_keeps_small_files() {
        let fx = Fixture::new();
        let small = fx.file("small", &[0u8; 10]);
        let big = fx.file("big", &[0u8; 1000]);
        let mut cfg = fx.config(tag("q"));
        cfg.quota = Some(Quota::new(QuotaMode::Skip, 500));
        fx.run(&cfg).0.unwrap();

        assert!(fx.tagged(&small, "q"));
        assert!(!fx.tagged(&big, "q"));
    }

    #[test]
    fn test_same_file_twice_is_tagged_once() {
        let fx = Fixture::new();
        let path = fx.file("f", b"");
        let mut cfg = fx.config(tag("v1"));
        cfg.paths = vec![path.clone(), path.clone(), fx.root()];

        let outcome = fx.run(&cfg).0.unwrap();
        assert_eq!(outcome.soft_errors, 0);
        assert!(fx.tagged(&path, "v1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_symlinks_need_follow_policy() {
        let fx = Fixture::new();
        let outside = TempDir::new().unwrap();
        let hidden = outside.path().join("hidden.txt");
        std::fs::write(&hidden, b"h").unwrap();
        std::os::unix::fs::symlink(outside.path(), fx.root().join("link")).unwrap();

        let cfg = fx.config(tag("v1"));
        fx.run(&cfg).0.unwrap();
        assert!(load_path(&fx.store, &hidden).unwrap().is_empty());

        let mut follow = cfg.clone();
        follow.symlinks = SymlinkPolicy::FollowAll;
        fx.run(&follow).0.unwrap();
        assert!(fx.tagged(&hidden, "v1"));
    }

    #[test]
    fn test_untag_purges_tree() {
        let fx = Fixture::new();
        let a = fx.file("a", b"");
        let b = fx.file("x/b", b"");
        fx.run(&fx.config(tag("v1"))).0.unwrap();
        assert_eq!(fx.store.len(), 2);

        let mut cfg = fx.config(Command::Untag {
            names: None,
            only: UntagConstraint::None,
        });
        cfg.print0 = true;
        let (result, out) = fx.run(&cfg);
        result.unwrap();
        assert!(fx.store.is_empty());

        let mut echoed: Vec<&str> = out.split('\0').filter(|s| !s.is_empty()).collect();
        echoed.sort();
        let mut expected = vec![a.display().to_string(), b.display().to_string()];
        expected.sort();
        assert_eq!(echoed, expected);
    }
}
