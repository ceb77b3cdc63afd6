// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! The scheduler hands each unit to a `UnitExecutor` and awaits the returned
//! future inside its bounded set of in-flight tasks.
//!
//! - [`CommandExecutor`](super::CommandExecutor) is the production
//!   implementation: one child process per unit.
//! - Tests provide their own `UnitExecutor` that, for example, sleeps for a
//!   configurable latency and records how many calls overlap.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::Result;
use crate::exec::ExecParams;
use crate::runner::registry::ProcessRegistry;
use crate::unit::{UnitResult, WorkUnit};

/// Future returned by [`UnitExecutor::execute`]. Owns everything it needs so
/// it can run on its own Tokio task.
pub type ExecFuture = Pin<Box<dyn Future<Output = Result<UnitResult>> + Send + 'static>>;

/// Per-call context for an executor.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub params: Arc<ExecParams>,
    /// Commit the unit should be resolved against, if known.
    pub base_commit: Option<String>,
    /// Every child process the executor spawns must be registered here so it
    /// can be terminated on interrupt.
    pub processes: ProcessRegistry,
}

/// Trait abstracting how a single unit is resolved.
pub trait UnitExecutor: Send + Sync {
    /// Execute `unit` and produce exactly one result, or fail.
    ///
    /// A unit that was processed but not resolved is still a result (with
    /// `success = false`); `Err` means the executor itself failed.
    fn execute(&self, unit: WorkUnit, ctx: ExecContext) -> ExecFuture;
}
