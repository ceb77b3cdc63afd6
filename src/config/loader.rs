// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the raw config the CLI asked for.
///
/// An explicit `path` must exist. Without one, [`default_config_path`] is
/// used when present and built-in defaults otherwise, so a run can be fully
/// described by flags.
pub fn load_raw(path: Option<&Path>) -> Result<RawConfigFile> {
    match path {
        Some(path) => load_from_path(path),
        None => {
            let default = default_config_path();
            if default.is_file() {
                load_from_path(&default)
            } else {
                debug!(path = %default.display(), "no config file; using defaults");
                Ok(RawConfigFile::default())
            }
        }
    }
}

/// Default config path: `Resolver.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Resolver.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailurePolicy, IssueType};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn full_file_loads_and_validates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Resolver.toml");
        fs::write(
            &path,
            r#"
[run]
concurrency = 4
output_dir = "out"
units = "issues.jsonl"
issue_type = "pr"
issue_numbers = [3, 5]
on_failure = "abort"
drain_grace = "250ms"

[executor]
cmd = "./resolve-one.sh"
max_iterations = 10
llm_model = "gpt-4o"

[executor.extra]
sandbox = "docker"
"#,
        )
        .unwrap();

        let cfg = load_and_validate(&path).unwrap();
        assert_eq!(cfg.run.concurrency, 4);
        assert_eq!(cfg.run.issue_type, IssueType::Pr);
        assert_eq!(cfg.run.issue_numbers, Some(vec![3, 5]));
        assert_eq!(cfg.run.on_failure, FailurePolicy::Abort);
        assert_eq!(cfg.drain_grace(), Duration::from_millis(250));
        assert_eq!(cfg.units_path(), Path::new("issues.jsonl"));
        assert_eq!(cfg.executor.max_iterations, 10);
        assert_eq!(
            cfg.executor.extra.get("sandbox"),
            Some(&serde_json::json!("docker"))
        );
    }

    #[test]
    fn empty_file_gets_defaults() {
        let raw: RawConfigFile = toml::from_str("").unwrap();
        assert_eq!(raw.run.concurrency, 1);
        assert_eq!(raw.run.output_dir, PathBuf::from("output"));
        assert_eq!(raw.run.drain_grace, "10s");
        assert_eq!(raw.executor.max_iterations, 50);
        assert!(raw.executor.cmd.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = toml::from_str::<RawConfigFile>("[run]\nworkers = 2\n").unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_raw(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
