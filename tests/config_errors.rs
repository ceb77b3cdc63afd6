mod common;
use crate::common::{init_tracing, sorted, with_timeout, TestResult};

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use issue_batch::cli::CliArgs;
use issue_batch::errors::BatchError;
use issue_batch::execute_batch;
use issue_batch::ledger::LEDGER_FILE_NAME;
use issue_batch::runner::{CancellationHandler, RunOutcome};
use issue_batch::unit::{UnitResult, WorkUnit};
use issue_batch_test_utils::{write_ledger, FakeExecutor, RawConfigBuilder};

fn write_units(path: &Path, numbers: &[u64]) {
    let lines: Vec<String> = numbers
        .iter()
        .map(|n| serde_json::to_string(&WorkUnit::new(*n, format!("issue {n}"))).unwrap())
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

#[tokio::test]
async fn selection_knobs_pick_the_batch() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let units = dir.path().join("issues.jsonl");
    let out = dir.path().join("out");
    write_units(&units, &[1, 2, 3, 4, 5]);

    let cfg = RawConfigBuilder::new(&units, &out)
        .concurrency(2)
        .issue_numbers(vec![2, 4, 5])
        .limit(2)
        .build();
    let executor = FakeExecutor::new();
    let stats = executor.stats();

    let summary = with_timeout(execute_batch(
        &cfg,
        Arc::new(executor),
        CancellationHandler::new(cfg.drain_grace()),
    ))
    .await?;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(sorted(stats.calls()), vec![2, 4]);
    assert!(out.join("infer_logs").is_dir());
    assert!(out.join(LEDGER_FILE_NAME).is_file());
    Ok(())
}

#[tokio::test]
async fn corrupt_ledger_stops_before_any_launch() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let units = dir.path().join("issues.jsonl");
    let out = dir.path().join("out");
    fs::create_dir_all(&out)?;
    write_units(&units, &[1, 2, 3]);

    let ledger = out.join(LEDGER_FILE_NAME);
    let good = UnitResult::new(WorkUnit::new(1, "issue 1"), true).to_line()?;
    fs::write(&ledger, format!("not json\n{good}\n"))?;
    let before = fs::read(&ledger)?;

    let cfg = RawConfigBuilder::new(&units, &out).build();
    let executor = FakeExecutor::new();
    let stats = executor.stats();

    let err = execute_batch(&cfg, Arc::new(executor), CancellationHandler::new(cfg.drain_grace()))
        .await
        .unwrap_err();

    match err {
        BatchError::CorruptLedgerEntry { line, .. } => assert_eq!(line, 1),
        other => panic!("expected CorruptLedgerEntry, got {other:?}"),
    }
    assert!(stats.calls().is_empty());
    assert_eq!(fs::read(&ledger)?, before);
    Ok(())
}

#[tokio::test]
async fn missing_unit_source_is_a_config_error() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let cfg = RawConfigBuilder::new(dir.path().join("nope.jsonl"), dir.path().join("out")).build();

    let err = execute_batch(
        &cfg,
        Arc::new(FakeExecutor::new()),
        CancellationHandler::new(cfg.drain_grace()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BatchError::ConfigError(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn repo_dir_that_is_not_a_clone_fails_start_up() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let units = dir.path().join("issues.jsonl");
    write_units(&units, &[1]);
    let mut raw = RawConfigBuilder::new(&units, dir.path().join("out")).raw();
    raw.run.repo_dir = Some(dir.path().join("no-repo"));
    let cfg = issue_batch::config::ConfigFile::try_from(raw)?;

    let executor = FakeExecutor::new();
    let stats = executor.stats();
    let err = execute_batch(&cfg, Arc::new(executor), CancellationHandler::new(cfg.drain_grace()))
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::ConfigError(_)), "{err:?}");
    assert!(stats.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn dry_run_reads_everything_and_runs_nothing() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let units = dir.path().join("issues.jsonl");
    let out = dir.path().join("out");
    fs::create_dir_all(&out)?;
    write_units(&units, &[1, 2]);
    write_ledger(
        &out.join(LEDGER_FILE_NAME),
        &[UnitResult::new(WorkUnit::new(1, "issue 1"), true)],
    );
    let before = fs::read(out.join(LEDGER_FILE_NAME))?;

    let config = dir.path().join("Resolver.toml");
    fs::write(
        &config,
        format!(
            "[run]\nunits = {:?}\noutput_dir = {:?}\n\n[executor]\ncmd = \"exit 1\"\n",
            units.display().to_string(),
            out.display().to_string()
        ),
    )?;

    let args = CliArgs {
        config: Some(config),
        dry_run: true,
        ..CliArgs::default()
    };
    let outcome = with_timeout(issue_batch::run(args)).await?;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(fs::read(out.join(LEDGER_FILE_NAME))?, before);
    assert!(!out.join("infer_logs").exists());
    Ok(())
}

#[tokio::test]
async fn zero_workers_from_the_cli_is_rejected() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let args = CliArgs {
        units: Some(dir.path().join("issues.jsonl")),
        executor_cmd: Some("true".into()),
        num_workers: Some(0),
        ..CliArgs::default()
    };

    let err = issue_batch::run(args).await.unwrap_err();
    assert!(err.to_string().contains("concurrency"), "{err}");
    Ok(())
}
