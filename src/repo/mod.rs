// src/repo/mod.rs

//! Working-tree preparation for units that need it.
//!
//! Pull-request units are resolved on their head branch, so the shared clone
//! has to be switched to that branch before the unit runs. The scheduler
//! holds an exclusive working-tree lock across the preparation and the
//! execution of such a unit.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{BatchError, Result};
use crate::unit::{UnitId, WorkUnit};

/// Future returned by [`RepositoryPrep::prepare`]: the base commit the unit
/// should run against, if the preparation determined one.
pub type PrepFuture = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'static>>;

/// Optional per-unit pre-step that mutates the shared working tree.
pub trait RepositoryPrep: Send + Sync {
    /// Whether `unit` needs this pre-step at all.
    fn requires_prep(&self, unit: &WorkUnit) -> bool {
        unit.head_branch.is_some()
    }

    /// Prepare the working tree for `unit`.
    ///
    /// Failures are [`BatchError::RepositoryStateError`] and abort only this
    /// unit's launch.
    fn prepare(&self, unit: &WorkUnit) -> PrepFuture;
}

/// Checks out a pull request's head branch in a local clone.
#[derive(Debug, Clone)]
pub struct GitCheckout {
    repo_dir: PathBuf,
}

impl GitCheckout {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }
}

impl RepositoryPrep for GitCheckout {
    fn prepare(&self, unit: &WorkUnit) -> PrepFuture {
        let repo_dir = self.repo_dir.clone();
        let id = unit.number;
        let branch = unit.head_branch.clone();

        Box::pin(async move {
            let Some(branch) = branch else {
                return Ok(None);
            };

            info!(unit = id, branch = %branch, "checking out head branch");
            git(&repo_dir, &["checkout", &branch])
                .await
                .map_err(|message| repo_error(id, message))?;

            let commit = git(&repo_dir, &["rev-parse", "HEAD"])
                .await
                .map_err(|message| repo_error(id, message))?;
            debug!(unit = id, commit = %commit, "head branch checked out");
            Ok(Some(commit))
        })
    }
}

fn repo_error(unit: UnitId, message: String) -> BatchError {
    BatchError::RepositoryStateError { unit, message }
}

/// Commit currently checked out in `repo_dir`.
pub async fn head_commit(repo_dir: &Path) -> Result<String> {
    git(repo_dir, &["rev-parse", "HEAD"])
        .await
        .map_err(BatchError::ConfigError)
}

/// Run git in `repo_dir` and return its trimmed stdout.
async fn git(repo_dir: &Path, args: &[&str]) -> std::result::Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .await
        .map_err(|e| format!("running git {}: {e}", args.join(" ")))?;

    if !output.status.success() {
        return Err(format!(
            "git {} failed in {:?} (exit code {}): {}",
            args.join(" "),
            repo_dir,
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn only_units_with_a_head_branch_need_prep() {
        let prep = GitCheckout::new("repo");
        assert!(!prep.requires_prep(&WorkUnit::new(1, "a")));
        assert!(prep.requires_prep(&WorkUnit::new(2, "b").with_head_branch("fix")));
    }

    #[tokio::test]
    async fn checkout_outside_a_repository_is_a_repository_state_error() {
        let dir = TempDir::new().unwrap();
        let prep = GitCheckout::new(dir.path());
        let unit = WorkUnit::new(3, "c").with_head_branch("does-not-exist");

        match prep.prepare(&unit).await {
            Err(BatchError::RepositoryStateError { unit, message }) => {
                assert_eq!(unit, 3);
                assert!(message.contains("checkout"));
            }
            other => panic!("expected RepositoryStateError, got {other:?}"),
        }
    }
}
