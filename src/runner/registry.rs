// src/runner/registry.rs

//! Registry of child processes spawned by in-flight executions.
//!
//! Executors register every subordinate process they start and keep the
//! returned [`ProcessGuard`] alive for as long as the process runs. During a
//! drain the cancellation handler walks the registry and sends each entry a
//! terminate request; the executor owning the process is responsible for
//! actually stopping it and dropping its guard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::unit::UnitId;

/// Run-scoped handle of a registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle(u64);

impl ProcessHandle {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Read-only view of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredProcess {
    pub handle: ProcessHandle,
    pub unit: UnitId,
    pub pid: Option<u32>,
}

#[derive(Debug)]
struct Entry {
    unit: UnitId,
    pid: Option<u32>,
    /// Taken when a terminate request is sent.
    terminate: Option<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct Inner {
    next_handle: AtomicU64,
    entries: Mutex<HashMap<ProcessHandle, Entry>>,
    /// Once set, new registrations are asked to terminate immediately.
    terminating: AtomicBool,
    live: watch::Sender<usize>,
}

/// Shared, cloneable registry. Clones refer to the same set of processes.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    inner: Arc<Inner>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        let (live, _) = watch::channel(0usize);
        Self {
            inner: Arc::new(Inner {
                next_handle: AtomicU64::new(1),
                entries: Mutex::new(HashMap::new()),
                terminating: AtomicBool::new(false),
                live,
            }),
        }
    }

    /// Register a process started for `unit`.
    ///
    /// The receiver fires when the process should be terminated. The entry is
    /// removed when the guard is dropped.
    pub fn register(&self, unit: UnitId, pid: Option<u32>) -> (ProcessGuard, oneshot::Receiver<()>) {
        let handle = ProcessHandle(self.inner.next_handle.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();

        let terminate = if self.inner.terminating.load(Ordering::SeqCst) {
            debug!(unit, ?pid, "process registered while draining; terminating at once");
            let _ = tx.send(());
            None
        } else {
            Some(tx)
        };

        let mut entries = self.lock();
        entries.insert(handle, Entry { unit, pid, terminate });
        self.inner.live.send_replace(entries.len());
        drop(entries);

        debug!(unit, ?pid, handle = handle.0, "registered child process");

        (
            ProcessGuard {
                registry: self.clone(),
                handle,
            },
            rx,
        )
    }

    /// Number of registered processes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registered processes, ordered by handle.
    pub fn snapshot(&self) -> Vec<RegisteredProcess> {
        let mut out: Vec<_> = self
            .lock()
            .iter()
            .map(|(handle, e)| RegisteredProcess {
                handle: *handle,
                unit: e.unit,
                pid: e.pid,
            })
            .collect();
        out.sort_by_key(|p| p.handle);
        out
    }

    /// Send a terminate request to every registered process, and to any
    /// process registered from now on. Returns how many requests were sent.
    pub fn terminate_all(&self) -> usize {
        self.inner.terminating.store(true, Ordering::SeqCst);

        let mut sent = 0;
        for (handle, entry) in self.lock().iter_mut() {
            if let Some(tx) = entry.terminate.take() {
                info!(
                    unit = entry.unit,
                    pid = ?entry.pid,
                    handle = handle.0,
                    "terminating child process"
                );
                if tx.send(()).is_ok() {
                    sent += 1;
                } else {
                    debug!(unit = entry.unit, "process owner already gone");
                }
            }
        }
        sent
    }

    /// Wait until every registered process has been released, or `grace`
    /// elapses. Returns `true` if the registry is empty.
    pub async fn wait_until_empty(&self, grace: Duration) -> bool {
        let mut rx = self.inner.live.subscribe();
        match tokio::time::timeout(grace, rx.wait_for(|n| *n == 0)).await {
            Ok(_) => true,
            Err(_) => {
                let left = self.snapshot();
                warn!(remaining = left.len(), ?left, "child processes still registered after grace period");
                false
            }
        }
    }

    fn release(&self, handle: ProcessHandle) {
        let mut entries = self.lock();
        if let Some(entry) = entries.remove(&handle) {
            debug!(unit = entry.unit, handle = handle.0, "released child process");
        }
        self.inner.live.send_replace(entries.len());
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProcessHandle, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a registry entry alive; dropping it removes the entry.
#[derive(Debug)]
pub struct ProcessGuard {
    registry: ProcessRegistry,
    handle: ProcessHandle,
}

impl ProcessGuard {
    pub fn handle(&self) -> ProcessHandle {
        self.handle
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.registry.release(self.handle);
    }
}
