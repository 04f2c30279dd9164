// ABOUTME: Engine-neutral cell values exchanged between source and target connections
// ABOUTME: Each driver module converts its native values to and from SqlValue

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A single column value read from or written to a connection.
///
/// The variants cover what SQL Server, PostgreSQL, and SQLite can hand back
/// for the types the migrator maps. Drivers coerce to whatever the target
/// column actually expects when binding.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

/// One result row, in the column order of the statement that produced it.
pub type Row = Vec<SqlValue>;

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value. Booleans count as 0/1, which is how SQLite
    /// and SQL Server catalogs report flags.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::Decimal(d) => i64::try_from(*d).ok(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Rewrite empty strings to NULL.
    ///
    /// Applied to every value regardless of the column's declared type, so a
    /// legitimately empty text value also arrives on the target as NULL.
    #[must_use]
    pub fn normalize_empty(self) -> SqlValue {
        match self {
            SqlValue::Text(s) if s.is_empty() => SqlValue::Null,
            other => other,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_empty_string_becomes_null() {
        assert_eq!(SqlValue::from("").normalize_empty(), SqlValue::Null);
        assert_eq!(
            SqlValue::from("x").normalize_empty(),
            SqlValue::Text("x".into())
        );
        assert_eq!(SqlValue::Int(0).normalize_empty(), SqlValue::Int(0));
        assert_eq!(SqlValue::Bytes(vec![]).normalize_empty(), SqlValue::Bytes(vec![]));
    }

    #[test]
    fn test_as_i64_accepts_catalog_shapes() {
        assert_eq!(SqlValue::Int(42).as_i64(), Some(42));
        assert_eq!(SqlValue::Bool(true).as_i64(), Some(1));
        assert_eq!(SqlValue::Text(" 7 ".into()).as_i64(), Some(7));
        assert_eq!(SqlValue::Null.as_i64(), None);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SqlValue::from(None::<&str>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(5i64)), SqlValue::Int(5));
    }
}
