use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, info};

use crate::runner::{CompileCommand, ProcessOutcome, ProcessRunner};

/// Nice value applied to pool workers (and inherited by their compilers).
#[cfg(unix)]
const BACKGROUND_NICE: i32 = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Idle,
    Sequential,
    Pooled { workers: usize },
}

/// Stops workers from picking up further commands once cancelled.
///
/// Commands that are already running always finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub strategy: ExecutionStrategy,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchTally {
    fn new(strategy: ExecutionStrategy, submitted: usize) -> Self {
        Self {
            strategy,
            submitted,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }

    fn record(&mut self, outcome: Option<ProcessOutcome>) {
        match outcome {
            Some(ProcessOutcome::Success) => self.succeeded += 1,
            Some(ProcessOutcome::Failure) => self.failed += 1,
            None => self.skipped += 1,
        }
    }
}

pub fn pool_size(command_count: usize, worker_limit: usize) -> usize {
    command_count.min(worker_limit.max(1))
}

#[derive(Debug, Clone, Copy)]
pub struct TaskScheduler {
    no_parallel: bool,
    worker_limit: usize,
}

impl TaskScheduler {
    pub fn new(no_parallel: bool, worker_limit: usize) -> Self {
        Self {
            no_parallel,
            worker_limit: worker_limit.max(1),
        }
    }

    pub fn select_strategy(&self, command_count: usize) -> ExecutionStrategy {
        match command_count {
            0 => ExecutionStrategy::Idle,
            1 => ExecutionStrategy::Sequential,
            _ if self.no_parallel => ExecutionStrategy::Sequential,
            count => ExecutionStrategy::Pooled {
                workers: pool_size(count, self.worker_limit),
            },
        }
    }

    /// Runs every command and tallies the outcomes. A failing command never
    /// stops the remaining ones; only failing to start the worker pool is an
    /// error.
    pub fn run(
        &self,
        runner: &dyn ProcessRunner,
        commands: &[CompileCommand],
        cancel: &CancellationToken,
    ) -> Result<BatchTally> {
        let strategy = self.select_strategy(commands.len());
        let mut tally = BatchTally::new(strategy, commands.len());
        match strategy {
            ExecutionStrategy::Idle => {
                debug!("No commands to run");
            }
            ExecutionStrategy::Sequential => {
                info!(commands = commands.len(), "Compiling sequentially");
                for command in commands {
                    tally.record(run_unless_cancelled(runner, command, cancel));
                }
            }
            ExecutionStrategy::Pooled { workers } => {
                info!(commands = commands.len(), workers, "Compiling in parallel");
                let pool = build_pool(workers)?;
                let outcomes: Vec<Option<ProcessOutcome>> = pool.install(|| {
                    commands
                        .par_iter()
                        .map(|command| run_unless_cancelled(runner, command, cancel))
                        .collect()
                });
                for outcome in outcomes {
                    tally.record(outcome);
                }
            }
        }
        Ok(tally)
    }
}

fn build_pool(workers: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("compile-worker-{index}"))
        .start_handler(|index| {
            if let Err(err) = lower_priority() {
                debug!(worker = index, error = %err, "Could not lower worker priority");
            }
        })
        .build()
        .with_context(|| format!("Failed to start a pool of {workers} compile workers"))
}

fn run_unless_cancelled(
    runner: &dyn ProcessRunner,
    command: &CompileCommand,
    cancel: &CancellationToken,
) -> Option<ProcessOutcome> {
    if cancel.is_cancelled() {
        debug!(script = %command.label, "Skipping command after cancellation");
        None
    } else {
        Some(runner.run(command))
    }
}

/// Moves the calling thread to the background scheduling tier.
///
/// On Linux the nice value is per thread, so only this worker and the
/// compilers it spawns are affected.
#[cfg(unix)]
pub fn lower_priority() -> io::Result<()> {
    rustix::process::setpriority_process(None, BACKGROUND_NICE)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn lower_priority() -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "priority throttling is not supported on this platform",
    ))
}
