// ABOUTME: Schema introspection of the migration source
// ABOUTME: Reads the catalog once and groups columns into ordered table descriptors

use std::collections::HashMap;

use crate::connection::{Connection, Dialect, Row};
use crate::error::{MigrateError, Result};

const SQLSERVER_CATALOG_QUERY: &str = "
    SELECT
        t.name AS table_name,
        c.name AS column_name,
        typ.name AS data_type,
        c.max_length,
        c.precision,
        c.scale,
        c.is_nullable
    FROM sys.tables t
    INNER JOIN sys.columns c ON t.object_id = c.object_id
    INNER JOIN sys.types typ ON c.user_type_id = typ.user_type_id
    ORDER BY t.name, c.column_id";

const SQLITE_CATALOG_QUERY: &str = "
    SELECT
        m.name AS table_name,
        p.name AS column_name,
        p.type AS data_type,
        0 AS max_length,
        0 AS precision,
        0 AS scale,
        CASE WHEN p.\"notnull\" = 0 THEN 1 ELSE 0 END AS is_nullable
    FROM sqlite_master m
    JOIN pragma_table_info(m.name) p
    WHERE m.type = 'table' AND substr(m.name, 1, 7) <> 'sqlite_'
    ORDER BY m.name, p.cid";

/// One column as described by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub source_type: String,
    /// Declared length in bytes; -1 means unbounded (`varchar(max)`).
    pub max_length: i32,
    pub precision: i32,
    pub scale: i32,
    pub nullable: bool,
}

/// A table and its columns in physical ordinal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Every table of the source, in catalog discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDescriptor {
    tables: Vec<TableDescriptor>,
    index: HashMap<String, usize>,
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Append a column to `table`, creating the table entry on first sight.
    pub fn push_column(&mut self, table: &str, column: ColumnDescriptor) {
        let idx = match self.index.get(table) {
            Some(&idx) => idx,
            None => {
                self.tables.push(TableDescriptor {
                    name: table.to_string(),
                    columns: Vec::new(),
                });
                self.index.insert(table.to_string(), self.tables.len() - 1);
                self.tables.len() - 1
            }
        };
        self.tables[idx].columns.push(column);
    }
}

impl FromIterator<TableDescriptor> for SchemaDescriptor {
    fn from_iter<I: IntoIterator<Item = TableDescriptor>>(iter: I) -> Self {
        let mut schema = SchemaDescriptor::new();
        for table in iter {
            if table.columns.is_empty() {
                continue;
            }
            let name = table.name.clone();
            for column in table.columns {
                schema.push_column(&name, column);
            }
        }
        schema
    }
}

/// Catalog query for a source dialect. Each returns
/// `(table, column, type, max_length, precision, scale, nullable)` rows
/// ordered by table then column ordinal.
pub fn catalog_query(dialect: Dialect) -> Result<&'static str> {
    match dialect {
        Dialect::SqlServer => Ok(SQLSERVER_CATALOG_QUERY),
        Dialect::Sqlite => Ok(SQLITE_CATALOG_QUERY),
        Dialect::Postgres => Err(MigrateError::Config(
            "PostgreSQL is not supported as a migration source".into(),
        )),
    }
}

/// Read the source catalog into a schema descriptor.
///
/// Any failure is a `SchemaRead` error: without a schema there is nothing to migrate.
pub async fn describe_schema(source: &mut dyn Connection) -> Result<SchemaDescriptor> {
    let query = catalog_query(source.dialect()).map_err(|e| MigrateError::SchemaRead(Box::new(e)))?;
    let rows = source.query(query, &[]).await.map_err(|e| {
        tracing::error!("Failed to get schema information: {}", e);
        MigrateError::SchemaRead(Box::new(e))
    })?;

    let mut schema = SchemaDescriptor::new();
    for row in &rows {
        let (table, column) = parse_catalog_row(row).map_err(|e| MigrateError::SchemaRead(Box::new(e)))?;
        schema.push_column(&table, column);
    }

    tracing::info!(
        "Found {} tables ({} columns) in {} source",
        schema.len(),
        schema.column_count(),
        source.dialect()
    );
    Ok(schema)
}

fn parse_catalog_row(row: &Row) -> Result<(String, ColumnDescriptor)> {
    if row.len() < 7 {
        return Err(MigrateError::value(
            "catalog row",
            format!("expected 7 columns, got {}", row.len()),
        ));
    }

    let text = |idx: usize, column: &str| -> Result<String> {
        if row[idx].is_null() {
            return Ok(String::new());
        }
        row[idx]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| MigrateError::value(column, format!("expected text, got {:?}", row[idx])))
    };
    let int = |idx: usize, column: &str| -> Result<i32> {
        row[idx]
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| MigrateError::value(column, format!("expected integer, got {:?}", row[idx])))
    };

    let table = text(0, "table_name")?;
    let name = text(1, "column_name")?;
    let declared = text(2, "data_type")?;
    let (source_type, declared_length, declared_precision, declared_scale) = parse_declared_type(&declared);

    let column = ColumnDescriptor {
        name,
        source_type,
        max_length: declared_length.unwrap_or(int(3, "max_length")?),
        precision: declared_precision.unwrap_or(int(4, "precision")?),
        scale: declared_scale.unwrap_or(int(5, "scale")?),
        nullable: row[6].as_bool().ok_or_else(|| {
            MigrateError::value("is_nullable", format!("expected flag, got {:?}", row[6]))
        })?,
    };
    Ok((table, column))
}

/// Split a declared type such as `VARCHAR(50)` or `DECIMAL(10,2)` into its
/// lowercase base name and the size arguments it carries.
///
/// Returns `(base, max_length, precision, scale)`. Lengths of `n`-prefixed
/// character types are converted to bytes so they read like SQL Server's catalog.
pub fn parse_declared_type(declared: &str) -> (String, Option<i32>, Option<i32>, Option<i32>) {
    let declared = declared.trim().to_lowercase();
    let Some(open) = declared.find('(') else {
        return (declared, None, None, None);
    };

    let base = declared[..open].trim().to_string();
    let args: Vec<&str> = declared[open + 1..]
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .collect();

    let first = args.first().copied().unwrap_or_default();
    let second = args.get(1).and_then(|s| s.parse::<i32>().ok());

    match base.as_str() {
        "decimal" | "numeric" => (base.clone(), None, first.parse().ok(), Some(second.unwrap_or(0))),
        _ => {
            let length = if first == "max" { Some(-1) } else { first.parse::<i32>().ok() };
            let length = match (base.as_str(), length) {
                ("nchar" | "nvarchar", Some(n)) if n > 0 => Some(n * 2),
                (_, length) => length,
            };
            (base, length, None, None)
        }
    }
}
