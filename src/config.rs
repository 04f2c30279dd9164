// ABOUTME: Run configuration loaded from a TOML file or environment variables
// ABOUTME: Describes the source and target databases plus batch size and type overrides

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_SQLITE_PATH: &str = "temp/vpic.db";

/// Complete configuration for one migration run. Read once at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub source: SourceConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub migration: MigrationSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    #[serde(rename = "sqlserver")]
    SqlServer(SqlServerConfig),
    Sqlite(SqliteSourceConfig),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TargetConfig {
    Postgres(PostgresConfig),
    Sqlite(SqliteTargetConfig),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SqlServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_mssql_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_mssql_user")]
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default = "default_true")]
    pub trust_cert: bool,
    #[serde(default = "default_true")]
    pub encrypt: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SqliteSourceConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PostgresConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_pg_user")]
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default = "default_connect_timeout", rename = "connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Create the database on the server when it does not exist yet.
    #[serde(default = "default_true")]
    pub create_database: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SqliteTargetConfig {
    #[serde(default = "default_sqlite_path")]
    pub path: PathBuf,
    /// Pragmas applied once after every table has been created.
    #[serde(default = "default_sqlite_pragmas")]
    pub pragmas: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MigrationSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Extra or replacement source-type → target-type entries.
    #[serde(default)]
    pub type_overrides: BTreeMap<String, String>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            type_overrides: BTreeMap::new(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_database() -> String {
    "vpic".to_string()
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_mssql_user() -> String {
    "sa".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_pg_user() -> String {
    "postgres".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from(DEFAULT_SQLITE_PATH)
}

pub fn default_sqlite_pragmas() -> BTreeMap<String, String> {
    [
        ("journal_mode", "WAL"),
        ("synchronous", "NORMAL"),
        ("foreign_keys", "ON"),
        ("cache_size", "-64000"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup with the environment variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let source = match or("SOURCE_DB", "sqlserver").to_lowercase().as_str() {
            "sqlserver" | "mssql" => SourceConfig::SqlServer(SqlServerConfig {
                host: or("MSSQL_HOST", "localhost"),
                port: parse_var("MSSQL_PORT", get("MSSQL_PORT"), default_mssql_port())?,
                database: or("MSSQL_DATABASE", "vpic"),
                user: or("MSSQL_USER", "sa"),
                password: or("MSSQL_PASSWORD", ""),
                trust_cert: parse_bool("MSSQL_TRUST_CERT", get("MSSQL_TRUST_CERT"), true)?,
                encrypt: parse_bool("MSSQL_ENCRYPT", get("MSSQL_ENCRYPT"), true)?,
            }),
            "sqlite" => SourceConfig::Sqlite(SqliteSourceConfig {
                path: get("SOURCE_SQLITE_PATH").map(PathBuf::from).ok_or_else(|| {
                    MigrateError::Config("SOURCE_SQLITE_PATH is required when SOURCE_DB=sqlite".into())
                })?,
            }),
            other => {
                return Err(MigrateError::Config(format!(
                    "Unsupported SOURCE_DB '{}'. Supported: sqlserver, sqlite",
                    other
                )))
            }
        };

        let target = match or("TARGET_DB", "postgres").to_lowercase().as_str() {
            "postgres" | "postgresql" => TargetConfig::Postgres(PostgresConfig {
                host: or("PG_HOST", "localhost"),
                port: parse_var("PG_PORT", get("PG_PORT"), default_pg_port())?,
                database: or("PG_DATABASE", "vpic"),
                user: or("PG_USER", "postgres"),
                password: or("PG_PASSWORD", ""),
                connect_timeout_secs: parse_var(
                    "PG_CONNECT_TIMEOUT",
                    get("PG_CONNECT_TIMEOUT"),
                    default_connect_timeout(),
                )?,
                create_database: parse_bool("PG_CREATE_DATABASE", get("PG_CREATE_DATABASE"), true)?,
            }),
            "sqlite" => TargetConfig::Sqlite(SqliteTargetConfig {
                path: PathBuf::from(or("SQLITE_PATH", DEFAULT_SQLITE_PATH)),
                pragmas: default_sqlite_pragmas(),
            }),
            other => {
                return Err(MigrateError::Config(format!(
                    "Unsupported TARGET_DB '{}'. Supported: postgres, sqlite",
                    other
                )))
            }
        };

        let config = Config {
            source,
            target,
            migration: MigrationSettings {
                batch_size: parse_var(
                    "MIGRATION_BATCH_SIZE",
                    get("MIGRATION_BATCH_SIZE"),
                    DEFAULT_BATCH_SIZE,
                )?,
                type_overrides: BTreeMap::new(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly run.
    pub fn validate(&self) -> Result<()> {
        if self.migration.batch_size == 0 {
            return Err(MigrateError::Config("batch_size must be greater than 0".into()));
        }

        match &self.source {
            SourceConfig::SqlServer(mssql) => {
                if mssql.port == 0 {
                    return Err(MigrateError::Config("MSSQL port must be greater than 0".into()));
                }
                if mssql.password.is_empty() {
                    return Err(MigrateError::Config(
                        "MSSQL_PASSWORD is required for a SQL Server source".into(),
                    ));
                }
            }
            SourceConfig::Sqlite(sqlite) => {
                if sqlite.path.as_os_str().is_empty() {
                    return Err(MigrateError::Config("SQLite source path cannot be empty".into()));
                }
            }
        }

        match &self.target {
            TargetConfig::Postgres(pg) => {
                if pg.port == 0 {
                    return Err(MigrateError::Config("PostgreSQL port must be greater than 0".into()));
                }
                if pg.password.is_empty() {
                    return Err(MigrateError::Config(
                        "PG_PASSWORD is required for a PostgreSQL target".into(),
                    ));
                }
            }
            TargetConfig::Sqlite(sqlite) => {
                if sqlite.path.as_os_str().is_empty() {
                    return Err(MigrateError::Config("SQLite target path cannot be empty".into()));
                }
            }
        }

        for (source_type, target_type) in &self.migration.type_overrides {
            if source_type.trim().is_empty() || target_type.trim().is_empty() {
                return Err(MigrateError::Config(format!(
                    "Invalid type override '{}' = '{}'",
                    source_type, target_type
                )));
            }
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| MigrateError::Config(format!("{} has an invalid value: '{}'", key, raw))),
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => Ok(false),
        Some(v) => Err(MigrateError::Config(format!(
            "{} must be true or false, got '{}'",
            key, v
        ))),
    }
}
