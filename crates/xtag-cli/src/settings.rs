//! Resolved run configuration.
//!
//! Command-line flags win over the configuration file, which wins over the
//! built-in defaults.

use std::path::PathBuf;

use clap::ValueEnum;
use xtag_config::{Config, LogLevel};
use xtag_record::Algorithm;
use xtag_walk::{ErrorMode, Quota, QuotaMode, SymlinkPolicy};

use crate::cli::{Cli, Commands};
use crate::error::{Result, XtagError};

/// Which files `tag` applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TagConstraint {
    #[default]
    #[value(skip)]
    None,
    /// Only files without any record
    Untagged,
    /// Only files without a valid record
    Invalid,
}

/// Which records `untag` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum UntagConstraint {
    #[default]
    #[value(skip)]
    None,
    /// Every record, regardless of --name
    All,
    /// Only invalid records
    Invalid,
}

/// Which files `print` lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PrintConstraint {
    #[default]
    #[value(skip)]
    None,
    /// Files whose records are all valid
    Valid,
    /// Files whose records are all invalid
    Invalid,
    /// Files without records
    Untagged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tag {
        name: String,
        only: TagConstraint,
    },
    Untag {
        names: Option<Vec<String>>,
        only: UntagConstraint,
    },
    Print {
        names: Option<Vec<String>>,
        only: PrintConstraint,
        records: bool,
    },
    Invalidate {
        names: Option<Vec<String>>,
    },
    Revalidate {
        names: Option<Vec<String>>,
        allow: bool,
    },
}

impl Command {
    /// Commands that may write metadata.
    pub fn mutates(&self) -> bool {
        !matches!(self, Command::Print { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Tag { .. } => "tag",
            Command::Untag { .. } => "untag",
            Command::Print { .. } => "print",
            Command::Invalidate { .. } => "invalidate",
            Command::Revalidate { .. } => "revalidate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub command: Command,
    pub paths: Vec<PathBuf>,
    pub algorithm: Algorithm,
    pub symlinks: SymlinkPolicy,
    pub forbid_recursion: bool,
    pub quota: Option<Quota>,
    pub multithread: bool,
    pub threads: Option<usize>,
    pub error_mode: ErrorMode,
    pub print0: bool,
    pub log_level: LogLevel,
}

impl RunConfig {
    /// Defaults for `command` on `paths`, as if no flag and no config file
    /// were given.
    pub fn new(command: Command, paths: Vec<PathBuf>) -> Self {
        Self {
            command,
            paths,
            algorithm: Algorithm::Sha256,
            symlinks: SymlinkPolicy::RejectDirs,
            forbid_recursion: false,
            quota: None,
            multithread: false,
            threads: None,
            error_mode: ErrorMode::LogAndContinue,
            print0: false,
            log_level: LogLevel::Error,
        }
    }

    /// Combine parsed arguments with the loaded configuration.
    pub fn from_cli(cli: Cli, config: &Config) -> Result<Self> {
        let (command, paths) = match cli.command {
            Commands::Tag { name, only, paths } => (
                Command::Tag {
                    name,
                    only: only.unwrap_or_default(),
                },
                paths,
            ),
            Commands::Untag { names, only, paths } => (
                Command::Untag {
                    names: non_empty(names),
                    only: only.unwrap_or_default(),
                },
                paths,
            ),
            Commands::Print {
                names,
                only,
                records,
                paths,
            } => (
                Command::Print {
                    names: non_empty(names),
                    only: only.unwrap_or_default(),
                    records,
                },
                paths,
            ),
            Commands::Invalidate { names, paths } => (
                Command::Invalidate {
                    names: non_empty(names),
                },
                paths,
            ),
            Commands::Revalidate {
                names,
                allow_revalidation,
                paths,
            } => (
                Command::Revalidate {
                    names: non_empty(names),
                    allow: allow_revalidation,
                },
                paths,
            ),
            Commands::Config { .. } => {
                return Err(XtagError::Usage(
                    "the config command does not operate on files".to_string(),
                ))
            }
        };

        if cli.limit_skip && cli.limit.is_none() {
            return Err(XtagError::Usage("--limit-skip requires --limit".to_string()));
        }
        if cli.threads == Some(0) {
            return Err(XtagError::Usage("--threads must be at least 1".to_string()));
        }

        let follow = cli.symlinks || config.walk.follow_symlinks;
        let stop = cli.hard || config.errors.stop_on_soft_error;
        // A zero limit disables the quota.
        let quota = cli.limit.filter(|bytes| *bytes > 0).map(|bytes| {
            let mode = if cli.limit_skip {
                QuotaMode::Skip
            } else {
                QuotaMode::Cutoff
            };
            Quota::new(mode, bytes)
        });

        Ok(Self {
            command,
            paths,
            algorithm: cli.hash.unwrap_or(config.hashing.algorithm),
            symlinks: if follow {
                SymlinkPolicy::FollowAll
            } else {
                SymlinkPolicy::RejectDirs
            },
            forbid_recursion: cli.no_recursion,
            quota,
            multithread: cli.mt,
            threads: cli.threads.or(config.dispatch.threads),
            error_mode: if stop {
                ErrorMode::StopOnSoftError
            } else {
                ErrorMode::LogAndContinue
            },
            print0: cli.print0,
            log_level: cli.log_level.unwrap_or(config.log.level),
        })
    }
}

fn non_empty(names: Vec<String>) -> Option<Vec<String>> {
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}
