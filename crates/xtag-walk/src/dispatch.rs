//! Worker fan-out for per-file operations.
//!
//! The walker stays on the calling thread and schedules each discovered file
//! onto a rayon pool. Failed jobs never report back to the walker directly:
//! they raise a shared cancellation flag and send their error to a single
//! collector thread over a crossbeam channel.
//!
//! # Shutdown order
//!
//! 1. the rayon scope ends once every scheduled job has finished
//! 2. the last sender is dropped, closing the error queue
//! 3. the collector drains the queue and is joined
//!
//! No reported error is dropped and no thread outlives [`Dispatcher::run`].

use std::cell::Cell;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::unbounded;
use rayon::ThreadPool;
use tracing::{debug, error};

use crate::walker::Flow;
use crate::DispatchError;

/// Default worker count: one per logical CPU.
pub fn default_thread_count() -> usize {
    num_cpus::get().max(1)
}

/// Result of one dispatched run.
#[derive(Debug)]
pub struct Dispatched<R, E> {
    /// Whatever the driving closure returned.
    pub value: R,
    /// Every error reported by a failed job, in arrival order.
    pub errors: Vec<E>,
    /// Number of jobs handed to the pool.
    pub scheduled: usize,
}

/// Handle given to the driving closure for scheduling jobs.
pub struct Scheduler<'a, T> {
    spawn: &'a (dyn Fn(T) + 'a),
    cancelled: &'a AtomicBool,
    scheduled: Cell<usize>,
}

impl<T> Scheduler<'_, T> {
    /// Hand `job` to the pool unless a previous job already failed.
    ///
    /// Returns `Flow::SkipAll` once cancelled so the walker stops. Jobs
    /// already running are not interrupted.
    pub fn schedule(&self, job: T) -> Flow {
        if self.is_cancelled() {
            debug!("Dispatcher cancelled, not scheduling further work");
            return Flow::SkipAll;
        }
        (self.spawn)(job);
        self.scheduled.set(self.scheduled.get() + 1);
        Flow::Continue
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn scheduled(&self) -> usize {
        self.scheduled.get()
    }
}

pub struct Dispatcher {
    pool: ThreadPool,
}

impl Dispatcher {
    /// Build a pool with `threads` workers, or one per CPU when `None`.
    pub fn new(threads: Option<usize>) -> Result<Self, DispatchError> {
        let num_threads = threads.unwrap_or_else(default_thread_count).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("xtag-worker-{}", i))
            .build()?;
        debug!(threads = num_threads, "Worker pool ready");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `drive` on the calling thread, executing every job it schedules
    /// with `op` on the pool.
    ///
    /// Returns after all jobs and the error collector have finished.
    pub fn run<T, E, R, Op, D>(&self, op: Op, drive: D) -> Result<Dispatched<R, E>, DispatchError>
    where
        T: Send + 'static,
        E: Send + Display + 'static,
        Op: Fn(T) -> Result<(), E> + Sync,
        D: FnOnce(&Scheduler<'_, T>) -> R,
    {
        let cancelled = AtomicBool::new(false);
        let (tx, rx) = unbounded::<E>();

        thread::scope(|s| {
            let collector = thread::Builder::new()
                .name("xtag-errors".to_string())
                .spawn_scoped(s, move || {
                    let mut errors = Vec::new();
                    for err in rx {
                        error!(error = %err, "Worker failed");
                        errors.push(err);
                    }
                    debug!(count = errors.len(), "Error collector exits");
                    errors
                })
                .map_err(DispatchError::Collector)?;

            let (value, scheduled) = self.pool.in_place_scope(|scope| {
                let op = &op;
                let cancelled = &cancelled;
                let tx = &tx;
                let spawn = move |job: T| {
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        if let Err(err) = op(job) {
                            cancelled.store(true, Ordering::SeqCst);
                            // The collector outlives every job.
                            let _ = tx.send(err);
                        }
                    });
                };
                let scheduler = Scheduler {
                    spawn: &spawn,
                    cancelled,
                    scheduled: Cell::new(0),
                };
                let value = drive(&scheduler);
                (value, scheduler.scheduled())
            });

            drop(tx);
            let errors = match collector.join() {
                Ok(errors) => errors,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            Ok(Dispatched {
                value,
                errors,
                scheduled,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[test]
    fn test_all_errors_collected_after_all_jobs() {
        let dispatcher = Dispatcher::new(Some(4)).unwrap();
        let ready = AtomicBool::new(false);
        let completed = AtomicUsize::new(0);

        let report = dispatcher
            .run(
                |job: usize| {
                    // Hold every job until all 100 are scheduled so that the
                    // first failure cannot cancel scheduling.
                    while !ready.load(Ordering::SeqCst) {
                        thread::yield_now();
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                    if job % 40 == 7 {
                        Err(format!("job {} failed", job))
                    } else {
                        Ok(())
                    }
                },
                |scheduler| {
                    for job in 0..100 {
                        assert_eq!(scheduler.schedule(job), Flow::Continue);
                    }
                    ready.store(true, Ordering::SeqCst);
                    "walked"
                },
            )
            .unwrap();

        assert_eq!(report.value, "walked");
        assert_eq!(report.scheduled, 100);
        assert_eq!(completed.load(Ordering::SeqCst), 100);
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn test_failure_cancels_scheduling() {
        let dispatcher = Dispatcher::new(Some(2)).unwrap();

        let report = dispatcher
            .run(
                |_: u32| Err("nope"),
                |scheduler| {
                    assert_eq!(scheduler.schedule(1), Flow::Continue);
                    let deadline = Instant::now() + Duration::from_secs(10);
                    while !scheduler.is_cancelled() && Instant::now() < deadline {
                        thread::sleep(Duration::from_millis(1));
                    }
                    scheduler.schedule(2)
                },
            )
            .unwrap();

        assert_eq!(report.value, Flow::SkipAll);
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.errors, vec!["nope"]);
    }

    #[test]
    fn test_worker_threads_are_named() {
        let dispatcher = Dispatcher::new(Some(1)).unwrap();
        assert_eq!(dispatcher.threads(), 1);

        let report = dispatcher
            .run(
                |_: ()| match thread::current().name() {
                    Some(name) if name.starts_with("xtag-worker-") => Ok(()),
                    other => Err(format!("unexpected thread name {:?}", other)),
                },
                |scheduler| scheduler.schedule(()),
            )
            .unwrap();
        assert!(report.errors.is_empty());
    }
}
