// src/unit/mod.rs

//! Work units and their results.
//!
//! - [`WorkUnit`] is one issue (or pull request) read from the unit source.
//! - [`UnitResult`] is what an executor produces for a unit; it is the record
//!   type of the completion ledger.
//! - [`source`] loads and selects the units of a batch.
//!
//! Both types keep unknown fields in a flattened map, so a record written by a
//! newer executor round-trips through the ledger without losing data.

pub mod source;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;

pub use source::{JsonlUnitSource, UnitSelection, UnitSource};

/// Stable identifier of a unit within a run (the issue number).
pub type UnitId = u64;

/// Metric key used for the short per-unit outcome summary.
pub const TEST_RESULT_METRIC: &str = "test_result";

/// One item of batch work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub number: UnitId,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub body: String,

    /// Head branch of a pull request; `None` for plain issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_branch: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Remaining fields of the source record, passed through to the executor.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkUnit {
    pub fn new(number: UnitId, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            body: String::new(),
            head_branch: None,
            labels: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_head_branch(mut self, branch: impl Into<String>) -> Self {
        self.head_branch = Some(branch.into());
        self
    }
}

/// Output of executing one unit. Produced once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub issue: WorkUnit,

    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UnitResult {
    pub fn new(issue: WorkUnit, success: bool) -> Self {
        Self {
            issue,
            success,
            base_commit: None,
            metrics: None,
            error: None,
            extra: Map::new(),
        }
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn id(&self) -> UnitId {
        self.issue.number
    }

    /// Short outcome summary for progress lines: the `test_result` metric,
    /// or `N/A` when the executor did not report one.
    pub fn test_result(&self) -> String {
        match self.metrics.as_ref().and_then(|m| m.get(TEST_RESULT_METRIC)) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "N/A".to_string(),
        }
    }

    /// Serialize as a single ledger line, without the trailing newline.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_line(line: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
