// ABOUTME: Uniform connection interface over SQL Server, PostgreSQL, and SQLite
// ABOUTME: Exports the Connection trait, dialect helpers, and config-driven connect functions

pub mod mssql;
pub mod postgres;
pub mod sqlite;
pub mod value;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{SourceConfig, TargetConfig};
use crate::error::{MigrateError, Result};
use crate::utils;

pub use mssql::MssqlConnection;
pub use postgres::PostgresConnection;
pub use sqlite::SqliteConnection;
pub use value::{Row, SqlValue};

/// SQL dialect spoken by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    SqlServer,
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Quote an identifier so names with spaces, mixed case, or reserved
    /// words survive the round trip.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Dialect::SqlServer => format!("[{}]", name.replace(']', "]]")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Positional parameter marker for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::SqlServer => format!("@P{}", index),
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Statement that opens an explicit transaction.
    pub fn begin_statement(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "BEGIN TRANSACTION",
            Dialect::Postgres | Dialect::Sqlite => "BEGIN",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::SqlServer => write!(f, "SQL Server"),
            Dialect::Postgres => write!(f, "PostgreSQL"),
            Dialect::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Capability interface the migration core talks to.
///
/// Every method takes `&mut self`: the SQL Server client requires exclusive
/// access per request, and the migrator never shares a connection anyway.
#[async_trait]
pub trait Connection: Send {
    fn dialect(&self) -> Dialect;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a query and fetch every row.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run one or more parameterless statements.
    async fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Run a query and fetch the first row, if any.
    async fn query_one(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    async fn begin(&mut self) -> Result<()> {
        let statement = self.dialect().begin_statement();
        self.execute_batch(statement).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute_batch("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute_batch("ROLLBACK").await
    }

    /// Release the connection. Dropping a connection also releases it; this
    /// gives drivers a chance to shut down cleanly and report errors.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Open the source connection described by `config`, retrying transient failures.
pub async fn connect_source(config: &SourceConfig) -> Result<Box<dyn Connection>> {
    let connection: Box<dyn Connection> = match config {
        SourceConfig::SqlServer(mssql) => {
            let conn = utils::retry_with_backoff(
                || MssqlConnection::connect(mssql),
                MigrateError::is_transient,
                3,
                Duration::from_secs(1),
            )
            .await
            .map_err(|e| MigrateError::connectivity("source", e.to_string()))?;
            Box::new(conn)
        }
        SourceConfig::Sqlite(sqlite) => {
            let conn = SqliteConnection::open_existing(&sqlite.path)
                .map_err(|e| MigrateError::connectivity("source", e.to_string()))?;
            Box::new(conn)
        }
    };

    tracing::info!("✓ Connected to source ({})", connection.dialect());
    Ok(connection)
}

/// Open the target connection described by `config`, retrying transient failures.
pub async fn connect_target(config: &TargetConfig) -> Result<Box<dyn Connection>> {
    let connection: Box<dyn Connection> = match config {
        TargetConfig::Postgres(pg) => {
            if pg.create_database {
                postgres::ensure_database(pg)
                    .await
                    .map_err(|e| MigrateError::connectivity("target", e.to_string()))?;
            }
            let conn = utils::retry_with_backoff(
                || PostgresConnection::connect(pg),
                MigrateError::is_transient,
                3,
                Duration::from_secs(1),
            )
            .await
            .map_err(|e| MigrateError::connectivity("target", e.to_string()))?;
            Box::new(conn)
        }
        TargetConfig::Sqlite(sqlite) => {
            let conn = SqliteConnection::open(&sqlite.path)
                .map_err(|e| MigrateError::connectivity("target", e.to_string()))?;
            Box::new(conn)
        }
    };

    tracing::info!("✓ Connected to target ({})", connection.dialect());
    Ok(connection)
}
