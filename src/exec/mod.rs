// src/exec/mod.rs

//! Unit execution layer.
//!
//! The scheduler talks to a [`UnitExecutor`] and never to processes
//! directly. This keeps the orchestration testable with fake executors while
//! the production executor lives in [`command`].
//!
//! - [`backend`] defines the `UnitExecutor` trait and the per-call context.
//! - [`command`] runs a shell command per unit via `tokio::process::Command`.
//! - [`process`] holds helpers for stopping child processes.

pub mod backend;
pub mod command;
pub mod process;

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::types::IssueType;

pub use backend::{ExecContext, ExecFuture, UnitExecutor};
pub use command::CommandExecutor;

/// Default iteration budget handed to executors.
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Fixed parameters passed unchanged to every executor invocation of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecParams {
    /// Shell command run per unit by [`CommandExecutor`].
    pub cmd: String,
    pub issue_type: IssueType,
    pub max_iterations: u32,
    pub output_dir: PathBuf,
    /// Directory for per-unit executor logs (`<output_dir>/infer_logs`).
    pub log_dir: PathBuf,
    pub container_image: Option<String>,
    pub llm_model: Option<String>,
    pub repo_instruction: Option<String>,
    /// Free-form parameters from `[executor.extra]`.
    pub extra: Map<String, Value>,
}

impl ExecParams {
    pub fn new(cmd: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            cmd: cmd.into(),
            issue_type: IssueType::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            log_dir: output_dir.join("infer_logs"),
            output_dir,
            container_image: None,
            llm_model: None,
            repo_instruction: None,
            extra: Map::new(),
        }
    }
}
