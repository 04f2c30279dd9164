// ABOUTME: Library module for sqlserver-migrator
// ABOUTME: Exports the migration engine, connections, and commands for the binary and tests

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod migration;
pub mod utils;

pub use config::Config;
pub use error::{MigrateError, Result};
