// src/config/mod.rs

//! Configuration loading and validation for issue-batch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like a positive concurrency (`validate.rs`).
//! - Turn a validated file into the runner's [`RunConfig`] (`run.rs`).

pub mod loader;
pub mod model;
pub mod run;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_raw};
pub use model::{ConfigFile, ExecutorSection, RawConfigFile, RunSection};
pub use run::{
    parse_duration, read_repo_instruction, RunConfig, DEFAULT_DRAIN_GRACE, REPO_INSTRUCTIONS_FILE,
};
