use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use issue_batch::errors::BatchError;
use issue_batch::exec::{ExecContext, ExecFuture, UnitExecutor};
use issue_batch::unit::{UnitId, UnitResult, WorkUnit, TEST_RESULT_METRIC};

/// What the fake executor observed.
#[derive(Debug, Default)]
pub struct ExecStats {
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    calls: Mutex<Vec<UnitId>>,
    base_commits: Mutex<HashMap<UnitId, Option<String>>>,
}

impl ExecStats {
    /// Most executions ever running at the same time.
    pub fn high_water_mark(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Units in the order their execution started.
    pub fn calls(&self) -> Vec<UnitId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn base_commit_for(&self, unit: UnitId) -> Option<String> {
        self.base_commits.lock().unwrap().get(&unit).cloned().flatten()
    }

    fn enter(self: &Arc<Self>, unit: UnitId, base_commit: Option<String>) -> Slot {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(unit);
        self.base_commits.lock().unwrap().insert(unit, base_commit);
        Slot(Arc::clone(self))
    }
}

struct Slot(Arc<ExecStats>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fake executor that:
/// - sleeps for a per-unit latency, then returns a successful result
/// - fails, panics or reports `success = false` for chosen units
/// - "hangs" chosen units: registers a fake child and waits for a terminate
///   request
/// - makes chosen units stubborn: registers a fake child and ignores the
///   terminate request
/// - records concurrency and call order in [`ExecStats`]
#[derive(Debug, Default)]
pub struct FakeExecutor {
    default_latency: Duration,
    latencies: HashMap<UnitId, Duration>,
    failing: HashSet<UnitId>,
    panicking: HashSet<UnitId>,
    unsuccessful: HashSet<UnitId>,
    hanging: HashSet<UnitId>,
    stubborn: HashSet<UnitId>,
    stats: Arc<ExecStats>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    pub fn with_unit_latency(mut self, unit: UnitId, latency: Duration) -> Self {
        self.latencies.insert(unit, latency);
        self
    }

    pub fn failing(mut self, unit: UnitId) -> Self {
        self.failing.insert(unit);
        self
    }

    pub fn panicking(mut self, unit: UnitId) -> Self {
        self.panicking.insert(unit);
        self
    }

    pub fn unsuccessful(mut self, unit: UnitId) -> Self {
        self.unsuccessful.insert(unit);
        self
    }

    pub fn hanging(mut self, unit: UnitId) -> Self {
        self.hanging.insert(unit);
        self
    }

    pub fn stubborn(mut self, unit: UnitId) -> Self {
        self.stubborn.insert(unit);
        self
    }

    pub fn stats(&self) -> Arc<ExecStats> {
        Arc::clone(&self.stats)
    }
}

impl UnitExecutor for FakeExecutor {
    fn execute(&self, unit: WorkUnit, ctx: ExecContext) -> ExecFuture {
        let id = unit.number;
        let latency = self
            .latencies
            .get(&id)
            .copied()
            .unwrap_or(self.default_latency);
        let fail = self.failing.contains(&id);
        let panics = self.panicking.contains(&id);
        let success = !self.unsuccessful.contains(&id);
        let hang = self.hanging.contains(&id);
        let stubborn = self.stubborn.contains(&id);
        let stats = Arc::clone(&self.stats);

        Box::pin(async move {
            let _slot = stats.enter(id, ctx.base_commit.clone());

            if hang {
                let (_child, terminate) = ctx.processes.register(id, None);
                let _ = terminate.await;
                return Err(BatchError::Terminated { unit: id });
            }

            if stubborn {
                let (_child, _terminate) = ctx.processes.register(id, None);
                std::future::pending::<()>().await;
            }

            tokio::time::sleep(latency).await;

            if panics {
                panic!("fake executor panicked on issue {id}");
            }
            if fail {
                return Err(BatchError::ExecutionError {
                    unit: id,
                    message: "injected failure".to_string(),
                });
            }

            let verdict = if success { "pass" } else { "fail" };
            Ok(UnitResult::new(unit, success).with_metric(TEST_RESULT_METRIC, verdict))
        })
    }
}
