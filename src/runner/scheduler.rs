// src/runner/scheduler.rs

//! Bounded scheduler.
//!
//! A single coordinating task owns the ledger writer, the progress counter
//! and a `JoinSet` of in-flight units. New units are launched only while the
//! set holds fewer than `concurrency` tasks, so the bound is structural.
//! Results are handled in completion order: ledger append first, then the
//! progress report, then the caller's callback.
//!
//! When a unit's executor fails, behaviour follows [`FailurePolicy`]:
//! - `Drain`: nothing new is launched, already-launched units finish and are
//!   recorded, then the run fails with the first error.
//! - `Abort`: nothing new is launched, child processes are terminated and the
//!   remaining in-flight results are discarded.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::errors::{BatchError, Result};
use crate::exec::{ExecContext, UnitExecutor};
use crate::ledger::{CompletedSet, LedgerWriter};
use crate::repo::RepositoryPrep;
use crate::runner::cancel::CancellationHandler;
use crate::runner::progress::{Progress, ProgressUpdate};
use crate::runner::{RunOutcome, RunSummary};
use crate::types::FailurePolicy;
use crate::unit::{UnitId, UnitResult, WorkUnit};

type UnitOutcome = (UnitId, Result<UnitResult>);

/// Drives all pending units of a batch under a concurrency ceiling.
pub struct BoundedScheduler {
    config: RunConfig,
    executor: Arc<dyn UnitExecutor>,
    ledger: LedgerWriter,
    cancel: CancellationHandler,
    prep: Option<Arc<dyn RepositoryPrep>>,
    base_commit: Option<String>,
    /// Held by a unit across its repository pre-step and execution.
    worktree: Arc<Mutex<()>>,
}

impl std::fmt::Debug for BoundedScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedScheduler")
            .field("config", &self.config)
            .field("ledger", &self.ledger.path())
            .field("base_commit", &self.base_commit)
            .finish_non_exhaustive()
    }
}

impl BoundedScheduler {
    pub fn new(
        config: RunConfig,
        executor: Arc<dyn UnitExecutor>,
        ledger: LedgerWriter,
        cancel: CancellationHandler,
    ) -> Self {
        Self {
            config,
            executor,
            ledger,
            cancel,
            prep: None,
            base_commit: None,
            worktree: Arc::new(Mutex::new(())),
        }
    }

    /// Run `prep` before every unit it applies to.
    pub fn with_repository_prep(mut self, prep: Arc<dyn RepositoryPrep>) -> Self {
        self.prep = Some(prep);
        self
    }

    /// Base commit handed to units that have no pre-step.
    pub fn with_base_commit(mut self, commit: impl Into<String>) -> Self {
        self.base_commit = Some(commit.into());
        self
    }

    /// Run every unit of `units` that is not in `completed`.
    ///
    /// `on_result` is called once per recorded result, after its ledger line
    /// has been written. The first executor failure is returned as the error
    /// of the whole run; results recorded before it stay in the ledger.
    pub async fn run<F>(
        mut self,
        units: Vec<WorkUnit>,
        completed: &CompletedSet,
        mut on_result: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(&UnitResult, &ProgressUpdate),
    {
        let limit = self.config.concurrency.max(1);
        let total = units.len();

        let mut pending: VecDeque<WorkUnit> = VecDeque::with_capacity(total);
        let mut skipped = 0;
        for unit in units {
            if completed.contains(&unit.number) {
                info!(unit = unit.number, "skipping issue as it is already finished");
                skipped += 1;
            } else {
                pending.push_back(unit);
            }
        }

        info!(
            finished = skipped,
            remaining = pending.len(),
            concurrency = limit,
            on_failure = ?self.config.on_failure,
            "starting batch"
        );

        let mut summary = RunSummary::new(total, skipped);
        let mut progress = Progress::new(pending.len());
        let mut in_flight: JoinSet<UnitOutcome> = JoinSet::new();
        let mut failure: Option<BatchError> = None;
        let mut interrupted = false;
        let mut aborting = false;
        let token = self.cancel.token();

        loop {
            while failure.is_none() && !token.is_cancelled() && in_flight.len() < limit {
                let Some(unit) = pending.pop_front() else {
                    break;
                };
                let id = unit.number;
                self.launch(&mut in_flight, unit);
                summary.attempted += 1;
                debug!(unit = id, in_flight = in_flight.len(), "launched issue");
            }
            debug_assert!(in_flight.len() <= limit);

            if in_flight.is_empty() {
                interrupted = token.is_cancelled() && !pending.is_empty();
                break;
            }

            let joined = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    interrupted = true;
                    break;
                }
                joined = in_flight.join_next() => joined,
            };

            let (id, outcome) = match joined {
                Some(Ok(done)) => done,
                Some(Err(e)) => {
                    warn!(error = %e, "issue task ended without an outcome");
                    continue;
                }
                None => continue,
            };

            match outcome {
                Ok(result) => {
                    if let Err(e) = self.ledger.append(&result).await {
                        error!(unit = id, error = %e, "failed to append result to ledger; stopping");
                        self.stop_in_flight(&mut in_flight).await;
                        self.cancel.terminate();
                        return Err(e);
                    }
                    if result.success {
                        summary.succeeded += 1;
                    } else {
                        summary.unsuccessful += 1;
                    }
                    let update = progress.record_result(&result);
                    on_result(&result, &update);
                }
                Err(err @ BatchError::RepositoryStateError { .. }) => {
                    warn!(unit = id, error = %err, "repository pre-step failed; issue not launched");
                    progress.record_failure(id, &err);
                    summary.launch_aborted += 1;
                }
                Err(err) => {
                    error!(unit = id, error = %err, "issue execution failed");
                    progress.record_failure(id, &err);
                    summary.failed += 1;

                    if failure.is_none() {
                        failure = Some(err);
                        match self.config.on_failure {
                            FailurePolicy::Drain => {
                                info!(
                                    in_flight = in_flight.len(),
                                    "no new issues will be launched; waiting for in-flight issues"
                                );
                            }
                            FailurePolicy::Abort => {
                                aborting = true;
                                break;
                            }
                        }
                    }
                }
            }
        }

        if interrupted || aborting {
            summary.discarded += self.stop_in_flight(&mut in_flight).await;
        }

        self.ledger.close().await?;
        self.cancel.terminate();

        summary.outcome = if failure.is_some() {
            RunOutcome::Failed
        } else if interrupted {
            RunOutcome::Interrupted
        } else {
            RunOutcome::Completed
        };
        summary.log();

        match failure {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    fn launch(&self, in_flight: &mut JoinSet<UnitOutcome>, unit: WorkUnit) {
        let id = unit.number;
        let executor = Arc::clone(&self.executor);
        let prep = self.prep.clone();
        let worktree = Arc::clone(&self.worktree);
        let ctx = ExecContext {
            params: Arc::clone(&self.config.params),
            base_commit: self.base_commit.clone(),
            processes: self.cancel.registry().clone(),
        };

        in_flight.spawn(async move {
            // Inner task so a panicking executor still reports its unit.
            let inner = tokio::spawn(run_unit(unit, executor, prep, worktree, ctx));
            let _abort = AbortOnDrop(inner.abort_handle());
            let outcome = match inner.await {
                Ok(outcome) => outcome,
                Err(e) => Err(BatchError::ExecutionError {
                    unit: id,
                    message: format!("executor task failed: {e}"),
                }),
            };
            (id, outcome)
        });
    }

    /// Terminate child processes, then join what is left and abort the rest.
    /// Both steps share one grace period. Returns the number of discarded
    /// results.
    async fn stop_in_flight(&self, in_flight: &mut JoinSet<UnitOutcome>) -> usize {
        info!(in_flight = in_flight.len(), "stopping in-flight issues");
        let deadline = tokio::time::Instant::now() + self.cancel.grace();
        self.cancel.drain().await;

        let mut discarded = 0;
        let joined = tokio::time::timeout_at(deadline, async {
            while let Some(joined) = in_flight.join_next().await {
                match joined {
                    Ok((id, Ok(_))) => {
                        warn!(unit = id, "discarding result that arrived while draining");
                        discarded += 1;
                    }
                    Ok((id, Err(e))) => {
                        debug!(unit = id, error = %e, "in-flight issue stopped");
                    }
                    Err(e) => debug!(error = %e, "in-flight task ended"),
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                remaining = in_flight.len(),
                "in-flight issues did not stop within the grace period; aborting them"
            );
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }

        discarded
    }
}

async fn run_unit(
    unit: WorkUnit,
    executor: Arc<dyn UnitExecutor>,
    prep: Option<Arc<dyn RepositoryPrep>>,
    worktree: Arc<Mutex<()>>,
    mut ctx: ExecContext,
) -> Result<UnitResult> {
    match prep {
        Some(prep) if prep.requires_prep(&unit) => {
            let _tree = worktree.lock_owned().await;
            if let Some(commit) = prep.prepare(&unit).await? {
                ctx.base_commit = Some(commit);
            }
            executor.execute(unit, ctx).await
        }
        _ => executor.execute(unit, ctx).await,
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
