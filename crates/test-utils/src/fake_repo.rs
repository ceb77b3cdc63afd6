use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use issue_batch::errors::BatchError;
use issue_batch::repo::{PrepFuture, RepositoryPrep};
use issue_batch::unit::{UnitId, WorkUnit};

/// A fake repository pre-step that records the branches it "checked out"
/// and fails for chosen units.
#[derive(Debug, Default)]
pub struct FakeCheckout {
    failing: HashSet<UnitId>,
    checked_out: Arc<Mutex<Vec<(UnitId, String)>>>,
}

impl FakeCheckout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, unit: UnitId) -> Self {
        self.failing.insert(unit);
        self
    }

    pub fn checked_out(&self) -> Arc<Mutex<Vec<(UnitId, String)>>> {
        Arc::clone(&self.checked_out)
    }

    /// Base commit reported for a branch.
    pub fn commit_for(branch: &str) -> String {
        format!("commit-of-{branch}")
    }
}

impl RepositoryPrep for FakeCheckout {
    fn prepare(&self, unit: &WorkUnit) -> PrepFuture {
        let id = unit.number;
        let branch = unit.head_branch.clone().unwrap_or_default();
        let fail = self.failing.contains(&id);
        let checked_out = Arc::clone(&self.checked_out);

        Box::pin(async move {
            tokio::task::yield_now().await;
            if fail {
                return Err(BatchError::RepositoryStateError {
                    unit: id,
                    message: format!("branch {branch} does not exist"),
                });
            }
            checked_out.lock().unwrap().push((id, branch.clone()));
            Ok(Some(FakeCheckout::commit_for(&branch)))
        })
    }
}
