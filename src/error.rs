// ABOUTME: Error taxonomy for the migration engine
// ABOUTME: Separates run-fatal failures from per-table failures the orchestrator records

use thiserror::Error;

/// SQL Server error numbers for rejected logins.
const MSSQL_LOGIN_FAILED: u32 = 18456;
const MSSQL_CANNOT_OPEN_DATABASE: u32 = 4060;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not open a connection to one side of the migration
    #[error("Failed to connect to {side} database: {message}")]
    Connectivity { side: &'static str, message: String },

    /// Credentials or access rules rejected the connection
    #[error("Authentication failed for {side} database: {message}")]
    Authentication { side: &'static str, message: String },

    /// The source catalog query could not run
    #[error("Failed to read source schema: {0}")]
    SchemaRead(#[source] Box<MigrateError>),

    /// Creating a target table failed
    #[error("Failed to create table {table}: {source}")]
    Ddl {
        table: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Moving rows for one table failed
    #[error("Transfer failed for table {table}: {source}")]
    Transfer {
        table: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Row counts differ after transfer
    #[error("Row count mismatch for table {table}: source={source_rows}, target={target_rows}")]
    VerificationMismatch {
        table: String,
        source_rows: i64,
        target_rows: i64,
    },

    /// A catalog or result value did not have the expected shape
    #[error("Unexpected value for {column}: {message}")]
    Value { column: String, message: String },

    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    pub fn connectivity(side: &'static str, message: impl Into<String>) -> Self {
        MigrateError::Connectivity {
            side,
            message: message.into(),
        }
    }

    pub fn ddl(table: impl Into<String>, source: MigrateError) -> Self {
        MigrateError::Ddl {
            table: table.into(),
            source: Box::new(source),
        }
    }

    pub fn transfer(table: impl Into<String>, source: MigrateError) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            source: Box::new(source),
        }
    }

    pub fn value(column: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Value {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole run rather than a single table.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::Config(_)
                | MigrateError::Connectivity { .. }
                | MigrateError::Authentication { .. }
                | MigrateError::SchemaRead(_)
                | MigrateError::Ddl { .. }
        )
    }

    /// Whether another connection attempt could succeed.
    ///
    /// Rejected credentials and unknown databases fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            MigrateError::Authentication { .. } | MigrateError::Config(_) => false,
            MigrateError::SqlServer(tiberius::error::Error::Server(token)) => {
                !matches!(token.code(), MSSQL_LOGIN_FAILED | MSSQL_CANNOT_OPEN_DATABASE)
            }
            _ => true,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MigrateError::connectivity("source", "refused").is_fatal());
        assert!(MigrateError::SchemaRead(Box::new(MigrateError::Config("x".into()))).is_fatal());
        assert!(MigrateError::ddl("t", MigrateError::Config("x".into())).is_fatal());

        assert!(!MigrateError::transfer("t", MigrateError::Config("x".into())).is_fatal());
        assert!(!MigrateError::VerificationMismatch {
            table: "t".into(),
            source_rows: 3,
            target_rows: 2,
        }
        .is_fatal());
    }

    #[test]
    fn test_authentication_errors_are_not_transient() {
        let auth = MigrateError::Authentication {
            side: "PostgreSQL",
            message: "Invalid username or password".into(),
        };
        assert!(!auth.is_transient());
        assert!(auth.is_fatal());

        assert!(MigrateError::connectivity("target", "Connection refused").is_transient());
        assert!(MigrateError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_transient());
    }

    #[test]
    fn test_format_detailed_includes_cause_chain() {
        let err = MigrateError::transfer("accounts", MigrateError::value("id", "not an integer"));
        let detailed = err.format_detailed();

        assert!(detailed.starts_with("Error: Transfer failed for table accounts"));
        assert!(detailed.contains("Caused by:\n  1: Unexpected value for id: not an integer"));
    }
}
