// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::config::run::parse_duration;
use crate::errors::{BatchError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::BatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_run_section(&raw)?;
        validate_executor_section(&raw)?;

        let units = raw.run.units.clone().ok_or_else(|| {
            BatchError::ConfigError(
                "no unit source: set [run].units or pass --units".to_string(),
            )
        })?;
        let drain_grace = parse_duration(&raw.run.drain_grace).map_err(|e| {
            BatchError::ConfigError(format!(
                "[run].drain_grace '{}' is invalid: {e}",
                raw.run.drain_grace
            ))
        })?;

        Ok(ConfigFile::new_unchecked(
            raw.run,
            raw.executor,
            units,
            drain_grace,
        ))
    }
}

fn validate_run_section(cfg: &RawConfigFile) -> Result<()> {
    let run = &cfg.run;

    if run.concurrency == 0 {
        return Err(BatchError::ConfigError(
            "[run].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    if run.limit == Some(0) {
        return Err(BatchError::ConfigError(
            "[run].limit must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(numbers) = &run.issue_numbers {
        if numbers.is_empty() {
            return Err(BatchError::ConfigError(
                "[run].issue_numbers must not be empty when given".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_executor_section(cfg: &RawConfigFile) -> Result<()> {
    let executor = &cfg.executor;

    if executor.cmd.trim().is_empty() {
        return Err(BatchError::ConfigError(
            "no executor command: set [executor].cmd or pass --executor-cmd".to_string(),
        ));
    }

    if executor.max_iterations == 0 {
        return Err(BatchError::ConfigError(
            "[executor].max_iterations must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}
