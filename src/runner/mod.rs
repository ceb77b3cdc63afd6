// src/runner/mod.rs

//! Bounded-concurrency resumable batch runner.
//!
//! This module ties together:
//! - the completion ledger (what is already done, where results go)
//! - the bounded scheduler that launches and awaits units
//! - progress reporting
//! - the cancellation handler and its process registry
//!
//! The scheduling loop lives in [`scheduler`]; interrupt handling and drain
//! live in [`cancel`] and [`registry`].

pub mod cancel;
pub mod progress;
pub mod registry;
pub mod scheduler;

use tracing::info;

pub use cancel::{CancellationHandler, RunPhase};
pub use progress::{Progress, ProgressUpdate};
pub use registry::{ProcessGuard, ProcessHandle, ProcessRegistry, RegisteredProcess};
pub use scheduler::BoundedScheduler;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every pending unit was processed.
    Completed,
    /// A unit's executor failed.
    Failed,
    /// Stopped by the operator.
    Interrupted,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Failed => 1,
            RunOutcome::Interrupted => 130,
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Units handed to the scheduler.
    pub total: usize,
    /// Units skipped because the ledger already had them.
    pub skipped: usize,
    /// Units launched in this run.
    pub attempted: usize,
    /// Results with `success = true`.
    pub succeeded: usize,
    /// Results with `success = false`.
    pub unsuccessful: usize,
    /// Units whose executor failed.
    pub failed: usize,
    /// Units whose repository pre-step failed.
    pub launch_aborted: usize,
    /// Results that arrived while draining and were not recorded.
    pub discarded: usize,
    pub outcome: RunOutcome,
}

impl RunSummary {
    pub fn new(total: usize, skipped: usize) -> Self {
        Self {
            total,
            skipped,
            attempted: 0,
            succeeded: 0,
            unsuccessful: 0,
            failed: 0,
            launch_aborted: 0,
            discarded: 0,
            outcome: RunOutcome::Completed,
        }
    }

    /// Units with a ledger line written in this run.
    pub fn recorded(&self) -> usize {
        self.succeeded + self.unsuccessful
    }

    pub fn log(&self) {
        info!(
            outcome = ?self.outcome,
            total = self.total,
            attempted = self.attempted,
            succeeded = self.succeeded,
            unsuccessful = self.unsuccessful,
            failed = self.failed,
            launch_aborted = self.launch_aborted,
            skipped = self.skipped,
            discarded = self.discarded,
            "run summary"
        );
    }
}
