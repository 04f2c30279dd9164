// ABOUTME: SQL Server connection over tiberius (TDS) used as the migration source
// ABOUTME: Converts TDS column data into SqlValue and binds SqlValue parameters

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::numeric::Numeric;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{Connection, Dialect, Row, SqlValue};
use crate::config::SqlServerConfig;
use crate::error::{MigrateError, Result};

pub struct MssqlConnection {
    client: Client<Compat<TcpStream>>,
}

impl MssqlConnection {
    /// Connect with SQL authentication to the configured database.
    pub async fn connect(config: &SqlServerConfig) -> Result<Self> {
        let tds_config = build_config(config);

        tracing::info!(
            "Connecting to SQL Server {}:{} - {}",
            config.host,
            config.port,
            config.database
        );

        let tcp = TcpStream::connect(tds_config.get_addr()).await?;
        tcp.set_nodelay(true)?;

        let client = Client::connect(tds_config, tcp.compat_write()).await?;
        Ok(Self { client })
    }
}

fn build_config(config: &SqlServerConfig) -> Config {
    let mut tds = Config::new();
    tds.host(&config.host);
    tds.port(config.port);
    tds.database(&config.database);
    tds.authentication(AuthMethod::sql_server(&config.user, &config.password));

    if config.encrypt {
        if config.trust_cert {
            tds.trust_cert();
        }
        tds.encryption(EncryptionLevel::Required);
    } else {
        tds.encryption(EncryptionLevel::NotSupported);
    }

    tds
}

fn bind_params<'a>(sql: &'a str, params: &[SqlValue]) -> Query<'a> {
    let mut query = Query::new(sql);
    for param in params {
        match param.clone() {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Float(v) => query.bind(v),
            SqlValue::Decimal(v) => query.bind(decimal_to_numeric(v)),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Bytes(v) => query.bind(v),
            SqlValue::Uuid(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Time(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::DateTimeOffset(v) => query.bind(v),
        }
    }
    query
}

/// tiberius binds decimals by value only as `Numeric`.
fn decimal_to_numeric(value: Decimal) -> Numeric {
    Numeric::new_with_scale(value.mantissa(), value.scale() as u8)
}

/// Convert one TDS cell into a SqlValue.
fn column_data_to_value(data: ColumnData<'static>) -> Result<SqlValue> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| SqlValue::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| SqlValue::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| SqlValue::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(SqlValue::Int),
        ColumnData::F32(v) => v.map(|v| SqlValue::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(SqlValue::Float),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.map(|s| SqlValue::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid),
        ColumnData::Binary(v) => v.map(|b| SqlValue::Bytes(b.into_owned())),
        ColumnData::Xml(v) => v.map(|x| SqlValue::Text(x.into_owned().into_string())),
        ColumnData::Numeric(_) => Decimal::from_sql(&data)?.map(SqlValue::Decimal),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)?.map(SqlValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?.map(SqlValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)?.map(SqlValue::Time),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<FixedOffset>::from_sql(&data)?.map(SqlValue::DateTimeOffset)
        }
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

fn convert_row(row: tiberius::Row) -> Result<Row> {
    row.into_iter().map(column_data_to_value).collect()
}

#[async_trait]
impl Connection for MssqlConnection {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let query = bind_params(sql, params);
        let result = query.execute(&mut self.client).await.map_err(|e| {
            tracing::error!("SQL Server statement failed: {}", e);
            MigrateError::from(e)
        })?;
        Ok(result.total())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let query = bind_params(sql, params);
        let stream = query.query(&mut self.client).await.map_err(|e| {
            tracing::error!("SQL Server query failed: {}", e);
            MigrateError::from(e)
        })?;
        let rows = stream.into_first_result().await?;
        rows.into_iter().map(convert_row).collect()
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client.close().await?;
        tracing::debug!("Closed SQL Server connection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_integer_column_data_widens_to_int() {
        assert_eq!(
            column_data_to_value(ColumnData::U8(Some(7))).unwrap(),
            SqlValue::Int(7)
        );
        assert_eq!(
            column_data_to_value(ColumnData::I16(Some(-3))).unwrap(),
            SqlValue::Int(-3)
        );
        assert_eq!(
            column_data_to_value(ColumnData::I32(Some(1_000))).unwrap(),
            SqlValue::Int(1_000)
        );
    }

    #[test]
    fn test_null_column_data_becomes_null() {
        assert_eq!(
            column_data_to_value(ColumnData::I32(None)).unwrap(),
            SqlValue::Null
        );
        assert_eq!(
            column_data_to_value(ColumnData::String(None)).unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn test_string_and_bit_column_data() {
        assert_eq!(
            column_data_to_value(ColumnData::String(Some(Cow::Borrowed("Honda")))).unwrap(),
            SqlValue::Text("Honda".into())
        );
        assert_eq!(
            column_data_to_value(ColumnData::Bit(Some(true))).unwrap(),
            SqlValue::Bool(true)
        );
    }

    #[test]
    fn test_decimal_binds_as_numeric_with_same_scale() {
        let numeric = decimal_to_numeric(Decimal::new(-123_456, 4));
        assert_eq!(numeric.value(), -123_456);
        assert_eq!(numeric.scale(), 4);

        let whole = decimal_to_numeric(Decimal::from(42));
        assert_eq!((whole.value(), whole.scale()), (42, 0));
    }

    #[test]
    fn test_build_config_uses_configured_address() {
        let config = SqlServerConfig {
            host: "db.internal".into(),
            port: 14330,
            database: "vpic".into(),
            user: "sa".into(),
            password: "secret".into(),
            trust_cert: true,
            encrypt: true,
        };

        let tds = build_config(&config);
        assert_eq!(tds.get_addr(), "db.internal:14330");
    }

    #[tokio::test]
    #[ignore]
    async fn test_connect_and_count_tables() {
        let config = SqlServerConfig {
            host: std::env::var("TEST_MSSQL_HOST").unwrap_or_else(|_| "localhost".into()),
            port: 1433,
            database: std::env::var("TEST_MSSQL_DATABASE").unwrap_or_else(|_| "master".into()),
            user: "sa".into(),
            password: std::env::var("TEST_MSSQL_PASSWORD").unwrap(),
            trust_cert: true,
            encrypt: true,
        };

        let mut conn = MssqlConnection::connect(&config).await.unwrap();
        let row = conn
            .query_one("SELECT COUNT(*) FROM sys.tables", &[])
            .await
            .unwrap()
            .unwrap();
        assert!(row[0].as_i64().is_some());
    }
}
