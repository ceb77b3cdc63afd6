#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use issue_batch::config::{ConfigFile, RawConfigFile, RunConfig};
use issue_batch::exec::{ExecParams, UnitExecutor};
use issue_batch::ledger::{self, LedgerSnapshot, LedgerWriter};
use issue_batch::runner::{BoundedScheduler, CancellationHandler};
use issue_batch::types::FailurePolicy;
use issue_batch::unit::{UnitId, UnitResult, WorkUnit};

/// Units numbered by `numbers`, titled after their number.
pub fn units(numbers: impl IntoIterator<Item = UnitId>) -> Vec<WorkUnit> {
    numbers
        .into_iter()
        .map(|n| WorkUnit::new(n, format!("issue {n}")))
        .collect()
}

/// Write `results` as ledger lines to `path`, replacing the file.
pub fn write_ledger(path: &Path, results: &[UnitResult]) {
    let mut contents = String::new();
    for result in results {
        contents.push_str(&result.to_line().expect("serialize ledger line"));
        contents.push('\n');
    }
    fs::write(path, contents).expect("write ledger");
}

/// A scheduler run rooted in a temporary output directory.
pub struct TestRun {
    pub dir: TempDir,
    pub config: RunConfig,
    pub cancel: CancellationHandler,
}

impl TestRun {
    pub fn new(concurrency: usize) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let params = ExecParams::new("true", dir.path());
        let config = RunConfig::new(concurrency, params).with_drain_grace(Duration::from_millis(500));
        let cancel = CancellationHandler::new(config.drain_grace);
        Self { dir, config, cancel }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.config = self.config.with_failure_policy(policy);
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.config = self.config.with_drain_grace(grace);
        self.cancel = CancellationHandler::new(grace);
        self
    }

    /// Run `cmd` for every unit instead of `true`.
    pub fn with_command(mut self, cmd: &str) -> Self {
        let mut params = (*self.config.params).clone();
        params.cmd = cmd.to_string();
        self.config.params = Arc::new(params);
        self
    }

    pub fn ledger_path(&self) -> &Path {
        &self.config.ledger_path
    }

    /// Load the ledger, open its writer and build a scheduler around
    /// `executor`.
    pub async fn scheduler(
        &self,
        executor: Arc<dyn UnitExecutor>,
    ) -> (BoundedScheduler, LedgerSnapshot) {
        let snapshot = ledger::load(self.ledger_path()).expect("load ledger");
        let writer = LedgerWriter::open(&snapshot).await.expect("open ledger");
        let scheduler =
            BoundedScheduler::new(self.config.clone(), executor, writer, self.cancel.clone());
        (scheduler, snapshot)
    }

    /// Issue numbers in the ledger, in file order.
    pub fn ledger_ids(&self) -> Vec<UnitId> {
        let contents = fs::read_to_string(self.ledger_path()).unwrap_or_default();
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| UnitResult::from_line(l).expect("ledger line parses").id())
            .collect()
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct RawConfigBuilder {
    config: RawConfigFile,
}

impl RawConfigBuilder {
    pub fn new(units: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let mut config = RawConfigFile::default();
        config.run.units = Some(units.into());
        config.run.output_dir = output_dir.into();
        config.executor.cmd = "true".to_string();
        Self { config }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.run.concurrency = n;
        self
    }

    pub fn issue_numbers(mut self, numbers: Vec<UnitId>) -> Self {
        self.config.run.issue_numbers = Some(numbers);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.config.run.limit = Some(limit);
        self
    }

    pub fn drain_grace(mut self, grace: &str) -> Self {
        self.config.run.drain_grace = grace.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}
