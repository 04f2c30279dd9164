// ABOUTME: SQLite connection used as the embedded migration target or a file-based source
// ABOUTME: Wraps rusqlite, applying connect-time pragmas and converting values to SqlValue

use std::path::Path;

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, OpenFlags, ToSql};

use super::{Connection, Dialect, Row, SqlValue};
use crate::error::{MigrateError, Result};

/// Pragmas applied whenever a target database is opened.
const CONNECT_PRAGMAS: [(&str, &str); 3] = [
    ("foreign_keys", "OFF"),
    ("journal_mode", "WAL"),
    ("synchronous", "NORMAL"),
];

pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open (or create) a target database file, creating its parent directory.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!("Opening SQLite database {}", path.display());
        let conn = rusqlite::Connection::open(path)?;
        for (name, value) in CONNECT_PRAGMAS {
            run_pragma(&conn, name, value)?;
        }
        Ok(Self { conn })
    }

    /// Open an existing database file read-only, for use as a migration source.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(MigrateError::Config(format!(
                "SQLite source database not found: {}",
                path.display()
            )));
        }

        tracing::info!("Opening SQLite source {}", path.display());
        let conn = rusqlite::Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }
}

/// Set a pragma, discarding whatever row it reports back.
fn run_pragma(conn: &rusqlite::Connection, name: &str, value: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA {}={}", name, value))?;
    let mut rows = stmt.query([])?;
    while rows.next()?.is_some() {}
    Ok(())
}

fn value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Int(v),
        ValueRef::Real(v) => SqlValue::Float(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Bytes(v.to_vec()),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            SqlValue::Int(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Decimal(v) => {
                use rust_decimal::prelude::ToPrimitive;
                match v.to_f64() {
                    Some(f) => ToSqlOutput::Owned(Value::Real(f)),
                    None => ToSqlOutput::Owned(Value::Text(v.to_string())),
                }
            }
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v.as_slice())),
            SqlValue::Uuid(v) => ToSqlOutput::Owned(Value::Text(v.to_string())),
            SqlValue::Date(v) => ToSqlOutput::Owned(Value::Text(v.format("%Y-%m-%d").to_string())),
            SqlValue::Time(v) => ToSqlOutput::Owned(Value::Text(v.format("%H:%M:%S%.f").to_string())),
            SqlValue::DateTime(v) => {
                ToSqlOutput::Owned(Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            }
            SqlValue::DateTimeOffset(v) => ToSqlOutput::Owned(Value::Text(v.to_rfc3339())),
        };
        Ok(output)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        Ok(affected as u64)
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                values.push(value_from_ref(row.get_ref(idx)?));
            }
            result.push(values);
        }
        Ok(result)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().map_err(|(_, e)| MigrateError::from(e))?;
        tracing::debug!("Closed SQLite connection");
        Ok(())
    }
}
