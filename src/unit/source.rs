// src/unit/source.rs

//! Unit sources.
//!
//! Fetching issues from a code host is not this crate's job; the batch is
//! handed over as a newline-delimited JSON file, one [`WorkUnit`] per line.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{BatchError, Result};
use crate::unit::{UnitId, WorkUnit};

/// Supplies the ordered list of units for a batch.
pub trait UnitSource {
    fn load(&self) -> Result<Vec<WorkUnit>>;
}

/// Reads units from a JSONL file. Blank lines are skipped.
#[derive(Debug, Clone)]
pub struct JsonlUnitSource {
    path: PathBuf,
}

impl JsonlUnitSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UnitSource for JsonlUnitSource {
    fn load(&self) -> Result<Vec<WorkUnit>> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            BatchError::ConfigError(format!("reading unit source {:?}: {e}", self.path))
        })?;

        let mut units = Vec::new();
        let mut seen: HashSet<UnitId> = HashSet::new();

        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let unit: WorkUnit = serde_json::from_str(line).map_err(|e| {
                BatchError::ConfigError(format!(
                    "unit source {:?} line {}: {e}",
                    self.path,
                    idx + 1
                ))
            })?;
            if !seen.insert(unit.number) {
                return Err(BatchError::ConfigError(format!(
                    "unit source {:?} lists issue {} more than once",
                    self.path, unit.number
                )));
            }
            units.push(unit);
        }

        debug!(path = ?self.path, count = units.len(), "loaded units from source");
        Ok(units)
    }
}

/// Which of the source's units make up the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSelection {
    /// Only these issue numbers, in source order.
    pub issue_numbers: Option<Vec<UnitId>>,
    /// Keep at most the first `limit` units after filtering by number.
    pub limit: Option<usize>,
}

impl UnitSelection {
    pub fn apply(&self, units: Vec<WorkUnit>) -> Vec<WorkUnit> {
        let mut selected: Vec<WorkUnit> = match &self.issue_numbers {
            Some(numbers) => {
                let wanted: HashSet<UnitId> = numbers.iter().copied().collect();
                units
                    .into_iter()
                    .filter(|u| wanted.contains(&u.number))
                    .collect()
            }
            None => units,
        };

        if let Some(limit) = self.limit {
            if selected.len() > limit {
                selected.truncate(limit);
            }
            info!(limit, "limiting batch to first {limit} issues");
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn units(ids: &[UnitId]) -> Vec<WorkUnit> {
        ids.iter().map(|&n| WorkUnit::new(n, format!("issue {n}"))).collect()
    }

    #[test]
    fn selection_filters_then_limits() {
        let selection = UnitSelection {
            issue_numbers: Some(vec![4, 2, 5]),
            limit: Some(2),
        };
        let ids: Vec<_> = selection
            .apply(units(&[1, 2, 3, 4, 5]))
            .iter()
            .map(|u| u.number)
            .collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[test]
    fn jsonl_source_rejects_duplicate_numbers() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"number":1,"title":"a"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"number":1,"title":"b"}}"#).unwrap();

        match JsonlUnitSource::new(file.path()).load() {
            Err(BatchError::ConfigError(msg)) => assert!(msg.contains("more than once")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn jsonl_source_keeps_extra_fields() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"number":9,"title":"fix","head_branch":"feature/x","thread_ids":["a"]}}"#
        )
        .unwrap();

        let loaded = JsonlUnitSource::new(file.path()).load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].head_branch.as_deref(), Some("feature/x"));
        assert!(loaded[0].extra.contains_key("thread_ids"));
    }
}
