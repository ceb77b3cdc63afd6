// src/config/run.rs

//! Runner configuration derived from a validated [`ConfigFile`].

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::model::ConfigFile;
use crate::errors::BatchError;
use crate::exec::ExecParams;
use crate::ledger::LEDGER_FILE_NAME;
use crate::types::FailurePolicy;

/// Grace period for in-flight units after an interrupt.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Instructions file looked up in `[run].repo_dir` when
/// `[executor].repo_instruction_file` is not set.
pub const REPO_INSTRUCTIONS_FILE: &str = ".openhands_instructions";

/// Everything the scheduler needs, immutable for the run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub concurrency: usize,
    pub ledger_path: PathBuf,
    pub on_failure: FailurePolicy,
    pub drain_grace: Duration,
    pub params: Arc<ExecParams>,
}

impl RunConfig {
    /// Ledger at `<output_dir>/output.jsonl`, default policy and grace.
    pub fn new(concurrency: usize, params: ExecParams) -> Self {
        Self {
            concurrency,
            ledger_path: params.output_dir.join(LEDGER_FILE_NAME),
            on_failure: FailurePolicy::default(),
            drain_grace: DEFAULT_DRAIN_GRACE,
            params: Arc::new(params),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = path.into();
        self
    }

    /// Build from a validated config. `repo_instruction` is the already-read
    /// text from [`read_repo_instruction`].
    pub fn from_config(cfg: &ConfigFile, repo_instruction: Option<String>) -> Self {
        let mut params = ExecParams::new(cfg.executor.cmd.clone(), cfg.run.output_dir.clone());
        params.issue_type = cfg.run.issue_type;
        params.max_iterations = cfg.executor.max_iterations;
        params.container_image = cfg.executor.container_image.clone();
        params.llm_model = cfg.executor.llm_model.clone();
        params.repo_instruction = repo_instruction;
        params.extra = cfg.executor.extra.clone();

        RunConfig::new(cfg.run.concurrency, params)
            .with_failure_policy(cfg.run.on_failure)
            .with_drain_grace(cfg.drain_grace())
    }
}

/// Repository instructions for the executor: `[executor].repo_instruction_file`
/// if set, else `<repo_dir>/.openhands_instructions` if that file exists.
pub fn read_repo_instruction(cfg: &ConfigFile) -> crate::errors::Result<Option<String>> {
    let path = match (&cfg.executor.repo_instruction_file, &cfg.run.repo_dir) {
        (Some(path), _) => path.clone(),
        (None, Some(repo_dir)) => {
            let path = repo_dir.join(REPO_INSTRUCTIONS_FILE);
            if !path.is_file() {
                return Ok(None);
            }
            path
        }
        (None, None) => return Ok(None),
    };

    fs::read_to_string(&path).map(Some).map_err(|e| {
        BatchError::ConfigError(format!("reading repo instruction file {:?}: {e}", path))
    })
}

/// Parse durations like `"500ms"`, `"3s"`, `"2m"`, `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = |per_unit: u64| {
        value
            .checked_mul(per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{}' is too large", s))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
