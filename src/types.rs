use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Kind of unit in a batch.
///
/// - `Issue`: an open issue, resolved from the repository's base commit.
/// - `Pr`: pull request review comments; the working tree is switched to the
///   pull request's head branch before the unit runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    #[default]
    Issue,
    Pr,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Issue => "issue",
            IssueType::Pr => "pr",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "issue" => Ok(IssueType::Issue),
            "pr" => Ok(IssueType::Pr),
            other => Err(format!(
                "invalid issue_type: {other} (expected \"issue\" or \"pr\")"
            )),
        }
    }
}

/// What the scheduler does with the rest of the batch once a unit's executor
/// fails.
///
/// - `Drain`: stop launching new units, let the already-launched ones finish
///   and record their results, then fail the run (default).
/// - `Abort`: stop launching, terminate in-flight child processes and fail
///   the run as soon as they are gone. In-flight results are lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Drain,
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drain" => Ok(FailurePolicy::Drain),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(format!(
                "invalid on_failure: {other} (expected \"drain\" or \"abort\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_type_parses_case_insensitively() {
        assert_eq!("PR".parse::<IssueType>(), Ok(IssueType::Pr));
        assert_eq!(" issue ".parse::<IssueType>(), Ok(IssueType::Issue));
        assert!("merge".parse::<IssueType>().is_err());
    }

    #[test]
    fn failure_policy_defaults_to_drain() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Drain);
        assert_eq!("abort".parse::<FailurePolicy>(), Ok(FailurePolicy::Abort));
    }
}
