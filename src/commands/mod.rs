// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports migrate, validate, and verify plus shared config loading

pub mod migrate;
pub mod validate;
pub mod verify;

pub use migrate::{migrate, MigrateOptions};
pub use validate::validate;
pub use verify::verify;

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;

/// Load configuration from a TOML file when given, otherwise from the environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Config::from_env().context("Failed to read configuration from environment"),
    }
}
