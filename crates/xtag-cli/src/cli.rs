//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use xtag_config::LogLevel;
use xtag_record::Algorithm;

use crate::settings::{PrintConstraint, TagConstraint, UntagConstraint};

/// xtag - tag files with integrity records kept in extended attributes
#[derive(Parser, Debug)]
#[command(name = "xtag")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Follow symlinks to directories too
    #[arg(long, global = true)]
    pub symlinks: bool,

    /// Hashing algorithm for new records (SHA256, RIPEMD160, SHA3256)
    #[arg(long, global = true, value_name = "ALGO")]
    pub hash: Option<Algorithm>,

    /// Stop after processing this many bytes of file content
    #[arg(long, global = true, value_name = "SIZE", value_parser = parse_size)]
    pub limit: Option<u64>,

    /// Skip files exceeding --limit instead of stopping
    #[arg(long, global = true)]
    pub limit_skip: bool,

    /// Abort on the first soft error
    #[arg(long, global = true)]
    pub hard: bool,

    /// Process files on a worker pool
    #[arg(long, global = true)]
    pub mt: bool,

    /// Worker threads for --mt
    #[arg(short = 'j', long, global = true)]
    pub threads: Option<usize>,

    /// Echo processed paths NUL-terminated
    #[arg(long, global = true)]
    pub print0: bool,

    /// Refuse to descend into directories
    #[arg(long, global = true)]
    pub no_recursion: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a record for every file
    Tag {
        /// Record name
        #[arg(long, value_parser = parse_name)]
        name: String,

        #[arg(long, value_enum)]
        only: Option<TagConstraint>,

        #[arg(required = true, value_name = "PATHS")]
        paths: Vec<PathBuf>,
    },

    /// Remove records
    Untag {
        /// Remove only this record (repeatable)
        #[arg(long = "name", value_parser = parse_name)]
        names: Vec<String>,

        #[arg(long, value_enum)]
        only: Option<UntagConstraint>,

        #[arg(required = true, value_name = "PATHS")]
        paths: Vec<PathBuf>,
    },

    /// List files and their records
    Print {
        #[arg(long = "name", value_parser = parse_name)]
        names: Vec<String>,

        #[arg(long, value_enum)]
        only: Option<PrintConstraint>,

        /// Dump the records as JSON
        #[arg(long)]
        records: bool,

        #[arg(required = true, value_name = "PATHS")]
        paths: Vec<PathBuf>,
    },

    /// Mark records whose checksum no longer matches as invalid
    Invalidate {
        #[arg(long = "name", value_parser = parse_name)]
        names: Vec<String>,

        #[arg(required = true, value_name = "PATHS")]
        paths: Vec<PathBuf>,
    },

    /// Mark invalid records whose checksum matches again as valid
    Revalidate {
        #[arg(long = "name", value_parser = parse_name)]
        names: Vec<String>,

        #[arg(long)]
        allow_revalidation: bool,

        #[arg(required = true, value_name = "PATHS")]
        paths: Vec<PathBuf>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show {
        /// Print the built-in defaults instead
        #[arg(long)]
        defaults: bool,
    },
}

fn parse_name(s: &str) -> Result<String, String> {
    xtag_record::validate_name(s)
        .map(|()| s.to_string())
        .map_err(|e| e.to_string())
}

/// Parse a size statement: decimal digits with an optional `K`, `M`, `G` or
/// `T` binary suffix.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let split = input
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, suffix) = input.split_at(split);
    if digits.is_empty() {
        return Err(format!("Could not parse size statement \"{}\"", input));
    }
    let base: u64 = digits
        .parse()
        .map_err(|e| format!("Could not parse size statement \"{}\": {}", input, e))?;
    let multiplier: u64 = match suffix {
        "" => 1,
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        "T" => 1 << 40,
        other => return Err(format!("Unknown size suffix \"{}\"", other)),
    };
    base.checked_mul(multiplier)
        .filter(|n| i64::try_from(*n).is_ok())
        .ok_or_else(|| format!("Size statement \"{}\" is too large", input))
}
