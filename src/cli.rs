// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every flag except `--config`, `--log-level` and `--dry-run` overrides the
//! matching key of the config file.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::RawConfigFile;
use crate::types::{FailurePolicy, IssueType};
use crate::unit::UnitId;

/// Command-line arguments for `issue-batch`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "issue-batch",
    version,
    about = "Resolve a batch of issues with a bounded number of concurrent agents, resumably.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Resolver.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// JSONL file with one issue per line.
    #[arg(long, value_name = "PATH")]
    pub units: Option<PathBuf>,

    /// Output directory for the ledger and executor logs.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of issues resolved concurrently.
    #[arg(long, value_name = "N")]
    pub num_workers: Option<usize>,

    /// Resolve at most this many issues.
    #[arg(long, value_name = "N")]
    pub limit_issues: Option<usize>,

    /// Comma separated issue numbers to resolve, e.g. `1,2,10`.
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub issue_numbers: Option<Vec<UnitId>>,

    /// `issue` or `pr`.
    #[arg(long, value_name = "TYPE")]
    pub issue_type: Option<IssueType>,

    /// Iteration budget handed to the executor.
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<u32>,

    /// Shell command run once per issue.
    #[arg(long, value_name = "CMD")]
    pub executor_cmd: Option<String>,

    /// `drain` or `abort`: what to do with in-flight issues after a failure.
    #[arg(long, value_name = "POLICY")]
    pub on_failure: Option<FailurePolicy>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ISSUE_BATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load config, units and ledger, print what would run, but don't
    /// execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Apply flag overrides to a freshly loaded config, before validation.
    pub fn apply_overrides(&self, raw: &mut RawConfigFile) {
        if let Some(units) = &self.units {
            raw.run.units = Some(units.clone());
        }
        if let Some(dir) = &self.output_dir {
            raw.run.output_dir = dir.clone();
        }
        if let Some(n) = self.num_workers {
            raw.run.concurrency = n;
        }
        if let Some(limit) = self.limit_issues {
            raw.run.limit = Some(limit);
        }
        if let Some(numbers) = &self.issue_numbers {
            raw.run.issue_numbers = Some(numbers.clone());
        }
        if let Some(issue_type) = self.issue_type {
            raw.run.issue_type = issue_type;
        }
        if let Some(policy) = self.on_failure {
            raw.run.on_failure = policy;
        }
        if let Some(n) = self.max_iterations {
            raw.executor.max_iterations = n;
        }
        if let Some(cmd) = &self.executor_cmd {
            raw.executor.cmd = cmd.clone();
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_file() {
        let args = CliArgs::try_parse_from([
            "issue-batch",
            "--units",
            "prs.jsonl",
            "--num-workers",
            "8",
            "--issue-numbers",
            "4,9,12",
            "--issue-type",
            "pr",
            "--on-failure",
            "abort",
            "--executor-cmd",
            "./resolve.sh",
        ])
        .unwrap();

        let mut raw = RawConfigFile::default();
        raw.run.concurrency = 2;
        raw.executor.cmd = "old".into();
        args.apply_overrides(&mut raw);

        assert_eq!(raw.run.units, Some(PathBuf::from("prs.jsonl")));
        assert_eq!(raw.run.concurrency, 8);
        assert_eq!(raw.run.issue_numbers, Some(vec![4, 9, 12]));
        assert_eq!(raw.run.issue_type, IssueType::Pr);
        assert_eq!(raw.run.on_failure, FailurePolicy::Abort);
        assert_eq!(raw.executor.cmd, "./resolve.sh");
        assert_eq!(raw.executor.max_iterations, 50);
    }

    #[test]
    fn absent_flags_leave_the_file_alone() {
        let args = CliArgs::try_parse_from(["issue-batch"]).unwrap();
        let mut raw = RawConfigFile::default();
        raw.run.concurrency = 3;
        args.apply_overrides(&mut raw);
        assert_eq!(raw.run.concurrency, 3);
        assert!(raw.run.units.is_none());
    }

    #[test]
    fn bad_issue_type_is_a_parse_error() {
        assert!(CliArgs::try_parse_from(["issue-batch", "--issue-type", "epic"]).is_err());
    }
}
