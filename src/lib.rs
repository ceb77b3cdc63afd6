// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod ledger;
pub mod logging;
pub mod repo;
pub mod runner;
pub mod types;
pub mod unit;

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_raw, read_repo_instruction, ConfigFile, RunConfig};
use crate::exec::{CommandExecutor, UnitExecutor};
use crate::ledger::{LedgerSnapshot, LedgerWriter};
use crate::repo::{head_commit, GitCheckout};
use crate::runner::{BoundedScheduler, CancellationHandler, RunOutcome, RunSummary};
use crate::types::IssueType;
use crate::unit::{JsonlUnitSource, UnitSelection, UnitSource, WorkUnit};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - unit source and selection
/// - ledger load
/// - command executor
/// - Ctrl-C / SIGTERM handling
pub async fn run(args: CliArgs) -> Result<RunOutcome> {
    let mut raw = load_raw(args.config.as_deref())?;
    args.apply_overrides(&mut raw);
    let cfg = ConfigFile::try_from(raw)?;

    if args.dry_run {
        let units = load_units(&cfg)?;
        let snapshot = ledger::load(ledger_path(&cfg))?;
        print_dry_run(&cfg, &units, &snapshot);
        return Ok(RunOutcome::Completed);
    }

    let cancel = CancellationHandler::new(cfg.drain_grace());
    let listener = cancel.spawn_signal_listener();

    let executor: Arc<dyn UnitExecutor> = Arc::new(CommandExecutor::new());
    let result = execute_batch(&cfg, executor, cancel).await;
    listener.abort();

    Ok(result?.outcome)
}

/// Run the batch described by `cfg` with `executor`.
///
/// Start-up failures (unreadable units, corrupt ledger, unusable repository)
/// are returned before anything is launched.
pub async fn execute_batch(
    cfg: &ConfigFile,
    executor: Arc<dyn UnitExecutor>,
    cancel: CancellationHandler,
) -> errors::Result<RunSummary> {
    let units = load_units(cfg)?;
    let run_config = RunConfig::from_config(cfg, read_repo_instruction(cfg)?);

    fs::create_dir_all(&run_config.params.output_dir)?;
    fs::create_dir_all(&run_config.params.log_dir)?;

    let snapshot = ledger::load(&run_config.ledger_path)?;
    info!(
        ledger = %snapshot.path.display(),
        finished = snapshot.completed.len(),
        "loaded completion ledger"
    );

    let repo_dir = cfg.run.repo_dir.clone();
    let is_pr = cfg.run.issue_type == IssueType::Pr;
    let base_commit = match &repo_dir {
        Some(dir) => Some(head_commit(dir).await?),
        None => None,
    };

    let writer = LedgerWriter::open(&snapshot).await?;
    let mut scheduler = BoundedScheduler::new(run_config, executor, writer, cancel);

    if let Some(commit) = base_commit {
        debug!(commit = %commit, "resolved repository base commit");
        scheduler = scheduler.with_base_commit(commit);
    }
    match (&repo_dir, is_pr) {
        (Some(dir), true) => {
            scheduler = scheduler.with_repository_prep(Arc::new(GitCheckout::new(dir)));
        }
        (None, true) => {
            warn!("pull request units run without a checkout; set [run].repo_dir to enable it");
        }
        _ => {}
    }

    scheduler.run(units, &snapshot.completed, |_, _| {}).await
}

fn load_units(cfg: &ConfigFile) -> errors::Result<Vec<WorkUnit>> {
    let units = JsonlUnitSource::new(cfg.units_path()).load()?;
    let selection = UnitSelection {
        issue_numbers: cfg.run.issue_numbers.clone(),
        limit: cfg.run.limit,
    };
    Ok(selection.apply(units))
}

fn ledger_path(cfg: &ConfigFile) -> std::path::PathBuf {
    cfg.run.output_dir.join(ledger::LEDGER_FILE_NAME)
}

/// Simple dry-run output: print what would run and what is already done.
fn print_dry_run(cfg: &ConfigFile, units: &[WorkUnit], snapshot: &LedgerSnapshot) {
    println!("issue-batch dry-run");
    println!("  run.concurrency = {}", cfg.run.concurrency);
    println!("  run.issue_type = {}", cfg.run.issue_type);
    println!("  run.on_failure = {:?}", cfg.run.on_failure);
    println!("  run.drain_grace = {:?}", cfg.drain_grace());
    println!("  ledger = {}", snapshot.path.display());
    println!("  executor.cmd = {}", cfg.executor.cmd);
    println!();

    let (done, pending): (Vec<&WorkUnit>, Vec<&WorkUnit>) =
        units.iter().partition(|u| snapshot.is_completed(u.number));

    println!("pending ({}):", pending.len());
    for unit in pending {
        match &unit.head_branch {
            Some(branch) => println!("  - #{} {} (branch {branch})", unit.number, unit.title),
            None => println!("  - #{} {}", unit.number, unit.title),
        }
    }

    println!("already finished ({}):", done.len());
    for unit in done {
        println!("  - #{} {}", unit.number, unit.title);
    }

    debug!("dry-run complete (no execution)");
}
