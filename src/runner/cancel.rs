// src/runner/cancel.rs

//! Operator-requested cancellation.
//!
//! The handler moves through `Running -> Interrupted -> Draining ->
//! Terminated`; phases only move forward. The scheduler polls
//! [`CancellationHandler::token`] to stop launching, calls
//! [`CancellationHandler::drain`] to terminate child processes, and marks the
//! run [`RunPhase::Terminated`] once the ledger is closed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::runner::registry::ProcessRegistry;

/// Lifecycle phase of a run with respect to cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    Running,
    /// An interrupt arrived; no new units are launched.
    Interrupted,
    /// Child processes of in-flight units are being terminated and joined.
    Draining,
    /// The ledger is closed; nothing more is written.
    Terminated,
}

/// Owns the interrupt token and the registry of spawned child processes.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct CancellationHandler {
    token: CancellationToken,
    phase: Arc<watch::Sender<RunPhase>>,
    registry: ProcessRegistry,
    grace: Duration,
}

impl CancellationHandler {
    pub fn new(grace: Duration) -> Self {
        let (phase, _) = watch::channel(RunPhase::Running);
        Self {
            token: CancellationToken::new(),
            phase: Arc::new(phase),
            registry: ProcessRegistry::new(),
            grace,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request a stop. Idempotent.
    pub fn interrupt(&self) {
        if self.advance(RunPhase::Interrupted) {
            info!("interrupt received; no new issues will be launched");
        }
        self.token.cancel();
    }

    /// Terminate every registered child process and wait for them to be
    /// released, bounded by the grace period. Returns `true` if none remain.
    pub async fn drain(&self) -> bool {
        self.advance(RunPhase::Draining);

        let sent = self.registry.terminate_all();
        info!(processes = sent, grace = ?self.grace, "draining in-flight child processes");

        let clean = self.registry.wait_until_empty(self.grace).await;
        if clean {
            debug!("all child processes released");
        } else {
            warn!(
                remaining = self.registry.len(),
                "grace period elapsed with child processes still registered"
            );
        }
        clean
    }

    /// Mark the run as finished. Called once the ledger has been closed.
    pub fn terminate(&self) {
        self.advance(RunPhase::Terminated);
    }

    /// Forward-only phase transition. Returns `true` if the phase changed.
    fn advance(&self, next: RunPhase) -> bool {
        self.phase.send_if_modified(|current| {
            if next > *current {
                debug!(from = ?*current, to = ?next, "run phase transition");
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Listen for Ctrl-C (and SIGTERM on unix) and turn the first one into an
    /// interrupt.
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let handler = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => handler.interrupt(),
                _ = handler.token.cancelled() => {}
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to listen for SIGTERM; only Ctrl-C will interrupt");
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                eprintln!("failed to listen for Ctrl+C: {e}");
                term.recv().await;
            }
        }
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn phases_only_move_forward() {
        let handler = CancellationHandler::new(Duration::from_millis(50));
        assert_eq!(handler.phase(), RunPhase::Running);

        handler.interrupt();
        handler.interrupt();
        assert_eq!(handler.phase(), RunPhase::Interrupted);
        assert!(handler.token().is_cancelled());

        assert!(handler.drain().await);
        assert_eq!(handler.phase(), RunPhase::Draining);

        handler.terminate();
        handler.interrupt();
        assert_eq!(handler.phase(), RunPhase::Terminated);
    }

    #[tokio::test]
    async fn drain_terminates_registered_processes() {
        let handler = CancellationHandler::new(Duration::from_secs(1));
        let (guard, rx) = handler.registry().register(7, None);

        let owner = tokio::spawn(async move {
            let _ = rx.await;
            drop(guard);
        });

        assert!(handler.drain().await);
        owner.await.unwrap();
        assert!(handler.registry().is_empty());
    }

    #[tokio::test]
    async fn signal_listener_exits_on_programmatic_interrupt() {
        let handler = CancellationHandler::new(Duration::from_millis(10));
        let listener = handler.spawn_signal_listener();
        handler.interrupt();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener did not stop")
            .unwrap();
    }
}
