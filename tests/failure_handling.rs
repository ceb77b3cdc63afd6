mod common;
use crate::common::{init_tracing, sorted, with_timeout, TestResult};

use std::sync::Arc;
use std::time::Duration;

use issue_batch::errors::BatchError;
use issue_batch::types::FailurePolicy;
use issue_batch::unit::WorkUnit;
use issue_batch_test_utils::{units, FakeCheckout, FakeExecutor, TestRun};

fn branch_units(numbers: impl IntoIterator<Item = u64>) -> Vec<WorkUnit> {
    numbers
        .into_iter()
        .map(|n| WorkUnit::new(n, format!("pr {n}")).with_head_branch(format!("branch-{n}")))
        .collect()
}

#[tokio::test]
async fn failure_surfaces_and_earlier_results_stay() -> TestResult {
    init_tracing();
    let run = TestRun::new(1);
    let executor = FakeExecutor::new().failing(7);
    let stats = executor.stats();

    let (scheduler, snapshot) = run.scheduler(Arc::new(executor)).await;
    let err = with_timeout(scheduler.run(units(1..=10), &snapshot.completed, |_, _| {}))
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::ExecutionError { unit: 7, .. }), "{err:?}");
    assert_eq!(err.unit(), Some(7));
    assert_eq!(run.ledger_ids(), (1..=6).collect::<Vec<_>>());
    assert_eq!(stats.calls(), (1..=7).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn drain_lets_launched_units_finish_and_launches_nothing_new() -> TestResult {
    init_tracing();
    let run = TestRun::new(3).with_policy(FailurePolicy::Drain);
    let executor = FakeExecutor::new()
        .with_latency(Duration::from_millis(40))
        .with_unit_latency(2, Duration::from_millis(5))
        .failing(2);
    let stats = executor.stats();

    let (scheduler, snapshot) = run.scheduler(Arc::new(executor)).await;
    let err = with_timeout(scheduler.run(units(1..=8), &snapshot.completed, |_, _| {}))
        .await
        .unwrap_err();

    assert_eq!(err.unit(), Some(2));
    assert_eq!(sorted(stats.calls()), vec![1, 2, 3]);
    assert_eq!(sorted(run.ledger_ids()), vec![1, 3]);
    Ok(())
}

#[tokio::test]
async fn abort_terminates_in_flight_units_and_records_nothing_more() -> TestResult {
    init_tracing();
    let run = TestRun::new(3)
        .with_policy(FailurePolicy::Abort)
        .with_grace(Duration::from_millis(500));
    let executor = FakeExecutor::new()
        .hanging(1)
        .hanging(3)
        .with_unit_latency(2, Duration::from_millis(10))
        .failing(2);
    let stats = executor.stats();
    let cancel = run.cancel.clone();

    let (scheduler, snapshot) = run.scheduler(Arc::new(executor)).await;
    let err = with_timeout(scheduler.run(units(1..=5), &snapshot.completed, |_, _| {}))
        .await
        .unwrap_err();

    assert_eq!(err.unit(), Some(2));
    assert_eq!(sorted(stats.calls()), vec![1, 2, 3]);
    assert!(run.ledger_ids().is_empty());
    assert!(cancel.registry().is_empty());
    assert_eq!(stats.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn repository_state_error_only_skips_that_unit() -> TestResult {
    init_tracing();
    let run = TestRun::new(2);
    let executor = FakeExecutor::new();
    let stats = executor.stats();
    let checkout = FakeCheckout::new().failing(2);
    let checked_out = checkout.checked_out();

    let (scheduler, snapshot) = run.scheduler(Arc::new(executor)).await;
    let summary = with_timeout(
        scheduler
            .with_repository_prep(Arc::new(checkout))
            .run(branch_units(1..=3), &snapshot.completed, |_, _| {}),
    )
    .await?;

    assert_eq!(summary.launch_aborted, 1);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(sorted(stats.calls()), vec![1, 3]);
    assert_eq!(sorted(run.ledger_ids()), vec![1, 3]);
    assert_eq!(checked_out.lock().unwrap().len(), 2);
    assert_eq!(
        stats.base_commit_for(3),
        Some(FakeCheckout::commit_for("branch-3"))
    );
    Ok(())
}

#[tokio::test]
async fn units_needing_a_checkout_hold_the_working_tree_one_at_a_time() -> TestResult {
    init_tracing();
    let run = TestRun::new(4);
    let executor = FakeExecutor::new().with_latency(Duration::from_millis(15));
    let stats = executor.stats();

    let (scheduler, snapshot) = run.scheduler(Arc::new(executor)).await;
    with_timeout(
        scheduler
            .with_repository_prep(Arc::new(FakeCheckout::new()))
            .run(branch_units(1..=4), &snapshot.completed, |_, _| {}),
    )
    .await?;

    assert_eq!(stats.high_water_mark(), 1);
    assert_eq!(sorted(run.ledger_ids()), vec![1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn units_without_a_branch_get_the_run_base_commit() -> TestResult {
    init_tracing();
    let run = TestRun::new(2);
    let executor = FakeExecutor::new();
    let stats = executor.stats();

    let (scheduler, snapshot) = run.scheduler(Arc::new(executor)).await;
    let mut mixed = units([1]);
    mixed.extend(branch_units([2]));
    with_timeout(
        scheduler
            .with_base_commit("abc123")
            .with_repository_prep(Arc::new(FakeCheckout::new()))
            .run(mixed, &snapshot.completed, |_, _| {}),
    )
    .await?;

    assert_eq!(stats.base_commit_for(1).as_deref(), Some("abc123"));
    assert_eq!(
        stats.base_commit_for(2),
        Some(FakeCheckout::commit_for("branch-2"))
    );
    Ok(())
}
