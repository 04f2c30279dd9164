// ABOUTME: PostgreSQL connection used as the relational migration target
// ABOUTME: Handles TLS setup, friendly connection errors, database creation, and value coercion

use std::collections::HashMap;
use std::error::Error as StdError;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, Statement};
use uuid::Uuid;

use super::{Connection, Dialect, Row, SqlValue};
use crate::config::PostgresConfig;
use crate::error::{MigrateError, Result};

type BoxError = Box<dyn StdError + Sync + Send>;

pub struct PostgresConnection {
    client: Client,
    /// Prepared statements keyed by SQL text; the per-row INSERT is prepared once per table.
    statements: HashMap<String, Statement>,
}

impl PostgresConnection {
    /// Connect to the configured database with TLS support
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        tracing::info!("Connecting to PostgreSQL - {}", config.database);
        let client = connect_client(config, &config.database).await?;
        Ok(Self {
            client,
            statements: HashMap::new(),
        })
    }

    async fn statement(&mut self, sql: &str) -> Result<Statement> {
        if let Some(statement) = self.statements.get(sql) {
            return Ok(statement.clone());
        }
        let statement = self.client.prepare(sql).await?;
        self.statements.insert(sql.to_string(), statement.clone());
        Ok(statement)
    }
}

fn pg_config(config: &PostgresConfig, database: &str) -> tokio_postgres::Config {
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .user(&config.user)
        .password(&config.password)
        .dbname(database)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .application_name("sqlserver-migrator");
    pg
}

async fn connect_client(config: &PostgresConfig, database: &str) -> Result<Client> {
    // Set up TLS connector; servers without TLS fall back to plaintext under sslmode=prefer
    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .map_err(|e| MigrateError::Config(format!("Failed to build TLS connector: {}", e)))?;
    let tls = MakeTlsConnector::new(tls_connector);

    let (client, connection) = pg_config(config, database)
        .connect(tls)
        .await
        .map_err(|e| describe_connect_error(&e.to_string()))?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    Ok(client)
}

/// Turn a raw driver error message into an actionable one.
fn describe_connect_error(error_msg: &str) -> MigrateError {
    if error_msg.contains("password authentication failed") {
        return MigrateError::Authentication {
            side: "PostgreSQL",
            message: "Invalid username or password.\n\
                      Please verify your database credentials."
                .to_string(),
        };
    }
    if error_msg.contains("no pg_hba.conf entry") {
        return MigrateError::Authentication {
            side: "PostgreSQL",
            message: format!(
                "Access denied: No pg_hba.conf entry for host.\n\
                 The database server is not configured to accept connections from your host.\n\
                 Error: {}",
                error_msg
            ),
        };
    }

    let message = if error_msg.contains("database") && error_msg.contains("does not exist") {
        format!(
            "Database does not exist: {}\n\
             Please create the database first or enable PG_CREATE_DATABASE.",
            error_msg
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect") {
        format!(
            "Connection refused: Unable to reach database server.\n\
             Please check:\n\
             - The host and port are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
        format!(
            "Connection timeout: Database server did not respond in time.\n\
             This could indicate network issues or server overload.\n\
             Error: {}",
            error_msg
        )
    } else {
        format!("Failed to connect to database: {}", error_msg)
    };

    MigrateError::connectivity("PostgreSQL", message)
}

/// Create the target database if it doesn't already exist.
///
/// Connects to the `postgres` maintenance database to check `pg_database`.
pub async fn ensure_database(config: &PostgresConfig) -> Result<()> {
    let client = connect_client(config, "postgres").await?;

    let exists = client
        .query_opt(
            "SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1",
            &[&config.database],
        )
        .await?
        .is_some();

    if exists {
        tracing::info!("PostgreSQL database already exists: {}", config.database);
        return Ok(());
    }

    let query = format!(
        "CREATE DATABASE {}",
        Dialect::Postgres.quote_identifier(&config.database)
    );
    match client.batch_execute(&query).await {
        Ok(()) => {
            tracing::info!("Created PostgreSQL database: {}", config.database);
            Ok(())
        }
        // Another session may have created it between the check and the create
        Err(e) if e.to_string().contains("already exists") => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn params_ref(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl Connection for PostgresConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let statement = self.statement(sql).await?;
        let affected = self
            .client
            .execute(&statement, &params_ref(params))
            .await
            .map_err(|e| {
                tracing::error!("PostgreSQL statement failed: {}", e);
                MigrateError::from(e)
            })?;
        Ok(affected)
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let rows = self
            .client
            .query(sql, &params_ref(params))
            .await
            .map_err(|e| {
                tracing::error!("PostgreSQL query failed: {}", e);
                MigrateError::from(e)
            })?;

        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| row.try_get::<_, SqlValue>(idx).map_err(MigrateError::from))
                    .collect::<Result<Row>>()
            })
            .collect()
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Dropping the client ends the spawned connection task
        drop(self);
        tracing::debug!("Closed PostgreSQL connection");
        Ok(())
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => match *ty {
                Type::INT2 | Type::INT4 | Type::INT8 => SqlValue::Int(i64::from(*v)).to_sql_checked(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            SqlValue::Int(v) => match *ty {
                Type::BOOL => (*v != 0).to_sql_checked(ty, out),
                Type::INT2 => i16::try_from(*v)?.to_sql_checked(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql_checked(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql_checked(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql_checked(ty, out),
                Type::NUMERIC => Decimal::from(*v).to_sql_checked(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            SqlValue::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql_checked(ty, out),
                Type::NUMERIC => Decimal::try_from(*v)?.to_sql_checked(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            SqlValue::Decimal(v) => match *ty {
                Type::FLOAT4 => v.to_f32().unwrap_or_default().to_sql_checked(ty, out),
                Type::FLOAT8 => v.to_f64().unwrap_or_default().to_sql_checked(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => {
                    SqlValue::Int(i64::try_from(*v)?).to_sql_checked(ty, out)
                }
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            SqlValue::Text(v) => text_to_sql(v, ty, out),
            SqlValue::Bytes(v) => v.to_sql_checked(ty, out),
            SqlValue::Uuid(v) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            SqlValue::Date(v) => match *ty {
                Type::TIMESTAMP => v.and_time(NaiveTime::default()).to_sql_checked(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            SqlValue::Time(v) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            SqlValue::DateTime(v) => match *ty {
                Type::DATE => v.date().to_sql_checked(ty, out),
                Type::TIMESTAMPTZ => v.and_utc().to_sql_checked(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            SqlValue::DateTimeOffset(v) => match *ty {
                Type::TIMESTAMP => v.naive_utc().to_sql_checked(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_rfc3339().to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Bind a text value to a non-text column by parsing it into the column's type.
///
/// Sources with loose typing (SQLite) hand back numbers, dates, and UUIDs as text.
fn text_to_sql(value: &str, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => parse_bool(value)?.to_sql_checked(ty, out),
        Type::INT2 => value.trim().parse::<i16>()?.to_sql_checked(ty, out),
        Type::INT4 => value.trim().parse::<i32>()?.to_sql_checked(ty, out),
        Type::INT8 => value.trim().parse::<i64>()?.to_sql_checked(ty, out),
        Type::FLOAT4 => value.trim().parse::<f32>()?.to_sql_checked(ty, out),
        Type::FLOAT8 => value.trim().parse::<f64>()?.to_sql_checked(ty, out),
        Type::NUMERIC => Decimal::from_str(value.trim())?.to_sql_checked(ty, out),
        Type::UUID => Uuid::parse_str(value.trim())?.to_sql_checked(ty, out),
        Type::DATE => NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")?.to_sql_checked(ty, out),
        Type::TIME => NaiveTime::from_str(value.trim())?.to_sql_checked(ty, out),
        Type::TIMESTAMP => parse_timestamp(value)?.to_sql_checked(ty, out),
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(value.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| parse_timestamp(value).map(|dt| dt.and_utc()))?
            .to_sql_checked(ty, out),
        Type::BYTEA => value.as_bytes().to_sql_checked(ty, out),
        Type::JSON | Type::JSONB => {
            serde_json::from_str::<serde_json::Value>(value)?.to_sql_checked(ty, out)
        }
        _ => value.to_sql_checked(ty, out),
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, BoxError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" => Ok(true),
        "0" | "f" | "false" | "n" | "no" => Ok(false),
        other => Err(format!("invalid boolean literal '{}'", other).into()),
    }
}

fn parse_timestamp(value: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
}

impl<'a> FromSql<'a> for SqlValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => SqlValue::Bool(bool::from_sql(ty, raw)?),
            Type::CHAR => SqlValue::Int(i64::from(i8::from_sql(ty, raw)?)),
            Type::INT2 => SqlValue::Int(i64::from(i16::from_sql(ty, raw)?)),
            Type::INT4 => SqlValue::Int(i64::from(i32::from_sql(ty, raw)?)),
            Type::INT8 => SqlValue::Int(i64::from_sql(ty, raw)?),
            Type::OID => SqlValue::Int(i64::from(u32::from_sql(ty, raw)?)),
            Type::FLOAT4 => SqlValue::Float(f64::from(f32::from_sql(ty, raw)?)),
            Type::FLOAT8 => SqlValue::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => SqlValue::Decimal(Decimal::from_sql(ty, raw)?),
            Type::BYTEA => SqlValue::Bytes(Vec::<u8>::from_sql(ty, raw)?),
            Type::UUID => SqlValue::Uuid(Uuid::from_sql(ty, raw)?),
            Type::DATE => SqlValue::Date(NaiveDate::from_sql(ty, raw)?),
            Type::TIME => SqlValue::Time(NaiveTime::from_sql(ty, raw)?),
            Type::TIMESTAMP => SqlValue::DateTime(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => {
                let utc = DateTime::<Utc>::from_sql(ty, raw)?;
                SqlValue::DateTimeOffset(utc.with_timezone(&FixedOffset::east_opt(0).ok_or("invalid UTC offset")?))
            }
            Type::JSON | Type::JSONB => {
                SqlValue::Text(serde_json::Value::from_sql(ty, raw)?.to_string())
            }
            _ => SqlValue::Text(String::from_utf8(raw.to_vec())?),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, BoxError> {
        Ok(SqlValue::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &SqlValue, ty: &Type) -> BytesMut {
        let mut out = BytesMut::new();
        let is_null = value.to_sql(ty, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::No));
        out
    }

    #[test]
    fn test_int_narrows_to_column_width() {
        let out = encode(&SqlValue::Int(42), &Type::INT4);
        assert_eq!(out.as_ref(), &42i32.to_be_bytes());

        let out = encode(&SqlValue::Int(7), &Type::INT2);
        assert_eq!(out.as_ref(), &7i16.to_be_bytes());
    }

    #[test]
    fn test_int_out_of_range_for_column_fails() {
        let mut out = BytesMut::new();
        assert!(SqlValue::Int(i64::MAX).to_sql(&Type::INT2, &mut out).is_err());
    }

    #[test]
    fn test_null_encodes_as_sql_null() {
        let mut out = BytesMut::new();
        let is_null = SqlValue::Null.to_sql(&Type::INT4, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
    }

    #[test]
    fn test_text_parses_into_typed_columns() {
        let out = encode(&SqlValue::Text("12".into()), &Type::INT8);
        assert_eq!(out.as_ref(), &12i64.to_be_bytes());

        let out = encode(&SqlValue::Text("true".into()), &Type::BOOL);
        assert_eq!(out.as_ref(), &[1u8]);

        let mut out = BytesMut::new();
        assert!(SqlValue::Text("abc".into()).to_sql(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn test_mismatched_value_and_column_type_is_rejected() {
        let mut out = BytesMut::new();
        let err = SqlValue::Int(1_700_000_000)
            .to_sql(&Type::TIMESTAMP, &mut out)
            .err().unwrap();
        assert!(err.is::<tokio_postgres::types::WrongType>());

        let mut out = BytesMut::new();
        assert!(SqlValue::Float(1.5).to_sql(&Type::INT4, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_matching_fallback_types_still_encode() {
        let out = encode(&SqlValue::Int(9), &Type::INT8);
        assert_eq!(out.as_ref(), &9i64.to_be_bytes());

        let out = encode(&SqlValue::Float(2.5), &Type::FLOAT8);
        assert_eq!(out.as_ref(), &2.5f64.to_be_bytes());
    }

    #[test]
    fn test_from_sql_round_trips_integers() {
        let value = SqlValue::from_sql(&Type::INT8, &99i64.to_be_bytes()).unwrap();
        assert_eq!(value, SqlValue::Int(99));

        let value = SqlValue::from_sql(&Type::INT2, &5i16.to_be_bytes()).unwrap();
        assert_eq!(value, SqlValue::Int(5));
    }

    #[test]
    fn test_from_sql_reads_text() {
        let value = SqlValue::from_sql(&Type::VARCHAR, b"Ford").unwrap();
        assert_eq!(value, SqlValue::Text("Ford".into()));
    }

    #[test]
    fn test_describe_connect_error_classifies_auth_failures() {
        let err = describe_connect_error("password authentication failed for user \"postgres\"");
        assert!(err.to_string().contains("Authentication failed"));
        assert!(err.is_fatal());
        assert!(!err.is_transient());

        let err = describe_connect_error("no pg_hba.conf entry for host \"10.0.0.5\"");
        assert!(!err.is_transient());

        let err = describe_connect_error("error connecting to server: Connection refused");
        assert!(err.is_transient());
    }

    #[tokio::test]
    #[ignore]
    async fn test_connect_with_valid_config_succeeds() {
        let config = PostgresConfig {
            host: std::env::var("TEST_PG_HOST").unwrap_or_else(|_| "localhost".into()),
            port: 5432,
            database: "postgres".into(),
            user: "postgres".into(),
            password: std::env::var("TEST_PG_PASSWORD").unwrap(),
            connect_timeout_secs: 10,
            create_database: false,
        };

        let mut conn = PostgresConnection::connect(&config).await.unwrap();
        let row = conn.query_one("SELECT 1::int8", &[]).await.unwrap().unwrap();
        assert_eq!(row, vec![SqlValue::Int(1)]);
    }
}
