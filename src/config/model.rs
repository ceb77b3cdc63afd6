// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::exec::DEFAULT_MAX_ITERATIONS;
use crate::types::{FailurePolicy, IssueType};
use crate::unit::UnitId;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [run]
/// concurrency = 4
/// output_dir = "output"
/// units = "issues.jsonl"
/// on_failure = "drain"
///
/// [executor]
/// cmd = "./resolve-one.sh"
/// max_iterations = 50
///
/// [executor.extra]
/// anything = "passed through"
/// ```
///
/// All sections are optional and have reasonable defaults. CLI overrides are
/// applied to this raw form before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub executor: ExecutorSection,
}

/// `[run]` section: what to process and how many at a time.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    /// Maximum number of units executing at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Directory holding the ledger (`output.jsonl`) and executor logs.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// JSONL file with one issue per line.
    #[serde(default)]
    pub units: Option<PathBuf>,

    #[serde(default)]
    pub issue_type: IssueType,

    /// Process only the first `limit` issues after selection.
    #[serde(default)]
    pub limit: Option<usize>,

    /// Process only these issues.
    #[serde(default)]
    pub issue_numbers: Option<Vec<UnitId>>,

    #[serde(default)]
    pub on_failure: FailurePolicy,

    /// How long in-flight units get to stop after an interrupt, e.g. `"10s"`.
    #[serde(default = "default_drain_grace")]
    pub drain_grace: String,

    /// Local clone used for pull request checkouts and the base commit.
    #[serde(default)]
    pub repo_dir: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_drain_grace() -> String {
    "10s".to_string()
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            output_dir: default_output_dir(),
            units: None,
            issue_type: IssueType::default(),
            limit: None,
            issue_numbers: None,
            on_failure: FailurePolicy::default(),
            drain_grace: default_drain_grace(),
            repo_dir: None,
        }
    }
}

/// `[executor]` section: the per-unit command and its fixed parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSection {
    /// Shell command run once per unit.
    #[serde(default)]
    pub cmd: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default)]
    pub container_image: Option<String>,

    #[serde(default)]
    pub llm_model: Option<String>,

    /// File whose contents are passed to every unit as `REPO_INSTRUCTION`.
    #[serde(default)]
    pub repo_instruction_file: Option<PathBuf>,

    /// Free-form parameters, handed to the command as `RUN_PARAMS` JSON.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            cmd: String::new(),
            max_iterations: default_max_iterations(),
            container_image: None,
            llm_model: None,
            repo_instruction_file: None,
            extra: Map::new(),
        }
    }
}

/// Validated configuration.
///
/// Built from [`RawConfigFile`] via `TryFrom`, see `validate.rs`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub run: RunSection,
    pub executor: ExecutorSection,
    units: PathBuf,
    drain_grace: Duration,
}

impl ConfigFile {
    /// Assemble a config without validation; `validate.rs` is the caller.
    pub(crate) fn new_unchecked(
        run: RunSection,
        executor: ExecutorSection,
        units: PathBuf,
        drain_grace: Duration,
    ) -> Self {
        Self {
            run,
            executor,
            units,
            drain_grace,
        }
    }

    /// Path of the unit source file.
    pub fn units_path(&self) -> &Path {
        &self.units
    }

    pub fn drain_grace(&self) -> Duration {
        self.drain_grace
    }
}
