//! # xtag-cli
//!
//! Command layer of xtag: argument parsing, run configuration, the per-file
//! operations and the driver that feeds them from the walker.

pub mod cli;
pub mod error;
pub mod ops;
pub mod output;
pub mod program;
pub mod settings;

pub use error::{Result, XtagError};
pub use output::Printer;
pub use program::{run, ExitStatus, Outcome};
pub use settings::{Command, RunConfig};
