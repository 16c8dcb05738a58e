//! Soft error policy.
//!
//! Every per-item failure that is allowed to be skipped goes through one
//! [`ErrorPolicy`] value. By default the error is logged, counted and the
//! run continues; in [`ErrorMode::StopOnSoftError`] it is handed back to the
//! caller, which aborts.

use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    #[default]
    LogAndContinue,
    StopOnSoftError,
}

/// Shared between the walker and worker threads; the counter is atomic.
#[derive(Debug, Default)]
pub struct ErrorPolicy {
    mode: ErrorMode,
    soft: AtomicUsize,
}

impl ErrorPolicy {
    pub fn new(mode: ErrorMode) -> Self {
        Self {
            mode,
            soft: AtomicUsize::new(0),
        }
    }

    pub fn mode(&self) -> ErrorMode {
        self.mode
    }

    /// Route a soft error through the policy.
    ///
    /// Returns `Ok(())` if the error was logged and should be skipped, or
    /// gives the error back if the run must stop.
    pub fn consume<E: Display>(&self, err: E) -> Result<(), E> {
        match self.mode {
            ErrorMode::LogAndContinue => {
                self.log(&err);
                Ok(())
            }
            ErrorMode::StopOnSoftError => Err(err),
        }
    }

    /// Log and count an error regardless of mode.
    pub fn log<E: Display + ?Sized>(&self, err: &E) {
        error!(error = %err, "Soft error");
        self.soft.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of soft errors logged so far.
    pub fn soft_count(&self) -> usize {
        self.soft.load(Ordering::Relaxed)
    }
}
