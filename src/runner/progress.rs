// src/runner/progress.rs

//! Live progress reporting.
//!
//! Status lines go through `tracing` under the `issue_batch::progress`
//! target, one per processed unit, with a monotonic `current/total` counter
//! that only counts units processed in this run.

use tracing::{info, warn};

use crate::errors::BatchError;
use crate::unit::{UnitId, UnitResult};

/// One progress report, handed to the scheduler's result callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub current: usize,
    pub total: usize,
    pub unit: UnitId,
    pub summary: String,
}

#[derive(Debug)]
pub struct Progress {
    total: usize,
    processed: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self { total, processed: 0 }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Report a finished unit.
    pub fn record_result(&mut self, result: &UnitResult) -> ProgressUpdate {
        self.processed += 1;
        let summary = format!("Test Result: {}", result.test_result());

        info!(
            target: "issue_batch::progress",
            current = self.processed,
            total = self.total,
            unit = result.id(),
            success = result.success,
            "[{}/{}] finished issue {}: {}",
            self.processed,
            self.total,
            result.id(),
            summary
        );

        ProgressUpdate {
            current: self.processed,
            total: self.total,
            unit: result.id(),
            summary,
        }
    }

    /// Report a unit that failed without producing a result.
    pub fn record_failure(&mut self, unit: UnitId, error: &BatchError) -> ProgressUpdate {
        self.processed += 1;
        let summary = format!("failed: {error}");

        warn!(
            target: "issue_batch::progress",
            current = self.processed,
            total = self.total,
            unit,
            "[{}/{}] issue {}: {}",
            self.processed,
            self.total,
            unit,
            summary
        );

        ProgressUpdate {
            current: self.processed,
            total: self.total,
            unit,
            summary,
        }
    }
}
