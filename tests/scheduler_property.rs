use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use issue_batch_test_utils::{units, FakeExecutor, TestRun};

fn run_batch(concurrency: usize, latencies: &[u64]) -> (usize, Vec<u64>, Vec<u64>) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let run = TestRun::new(concurrency);
        let mut executor = FakeExecutor::new();
        for (i, ms) in latencies.iter().enumerate() {
            executor = executor.with_unit_latency(i as u64 + 1, Duration::from_millis(*ms));
        }
        let stats = executor.stats();

        let mut seen = Vec::new();
        let (scheduler, snapshot) = run.scheduler(Arc::new(executor)).await;
        scheduler
            .run(
                units(1..=latencies.len() as u64),
                &snapshot.completed,
                |result, _| seen.push(result.id()),
            )
            .await
            .unwrap();

        (stats.high_water_mark(), seen, run.ledger_ids())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn bounded_and_exactly_once(
        concurrency in 1usize..5,
        latencies in proptest::collection::vec(0u64..12, 1..14),
    ) {
        let (high_water, seen, ledger) = run_batch(concurrency, &latencies);
        let n = latencies.len();

        prop_assert!(high_water <= concurrency);
        prop_assert!(high_water >= 1);
        prop_assert_eq!(seen.len(), n);
        prop_assert_eq!(seen.iter().copied().collect::<HashSet<_>>().len(), n);
        prop_assert_eq!(&ledger, &seen);
    }
}
