#![allow(dead_code)]

use std::error::Error;
use std::time::Duration;

pub use issue_batch_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Poll `cond` every few milliseconds until it holds, for at most 5 seconds.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    with_timeout(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Sorted copy of `ids`.
pub fn sorted(mut ids: Vec<u64>) -> Vec<u64> {
    ids.sort_unstable();
    ids
}
