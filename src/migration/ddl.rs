// ABOUTME: Generates target CREATE TABLE statements and runs the table-creation phase
// ABOUTME: Creation is all-or-nothing when the target supports transactional DDL

use crate::connection::Connection;
use crate::error::{MigrateError, Result};
use crate::migration::profile::TargetProfile;
use crate::migration::schema::{ColumnDescriptor, SchemaDescriptor, TableDescriptor};
use crate::migration::typemap::{TargetEngine, TypeMapper};

/// Build the drop-and-create statement for one table.
///
/// Output is deterministic: the same descriptor always yields the same text.
pub fn generate_create_table(
    table: &TableDescriptor,
    mapper: &TypeMapper,
    profile: &TargetProfile,
) -> String {
    let name = profile.quote(&table.name);
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|column| {
            let mut definition = format!(
                "    {} {}",
                profile.quote(&column.name),
                column_type(column, mapper, profile.engine)
            );
            if !column.nullable {
                definition.push_str(" NOT NULL");
            }
            definition
        })
        .collect();

    format!(
        "DROP TABLE IF EXISTS {name};\nCREATE TABLE {name} (\n{}\n);",
        columns.join(",\n"),
        name = name
    )
}

/// Target type for a column, carrying the source size onto bare sized types.
fn column_type(column: &ColumnDescriptor, mapper: &TypeMapper, engine: TargetEngine) -> String {
    let mapped = mapper.map(&column.source_type, engine);
    if engine == TargetEngine::EmbeddedLite {
        return mapped;
    }

    match mapped.as_str() {
        "char" | "varchar" => match character_length(column) {
            Some(length) => format!("{}({})", mapped, length),
            None => mapped,
        },
        "decimal" | "numeric" if column.precision > 0 => {
            format!("{}({},{})", mapped, column.precision, column.scale)
        }
        _ => mapped,
    }
}

/// Character length from the catalog's byte length; `None` for unbounded or unknown.
fn character_length(column: &ColumnDescriptor) -> Option<i32> {
    if column.max_length <= 0 {
        return None;
    }
    let source_type = column.source_type.to_lowercase();
    if source_type == "nchar" || source_type == "nvarchar" {
        Some((column.max_length / 2).max(1))
    } else {
        Some(column.max_length)
    }
}

/// Create every table in the schema on the target.
///
/// With transactional DDL all tables are created in one transaction and a
/// failure rolls everything back. Without it tables are created one by one
/// and a failure leaves the tables created so far in place. Either way a
/// failure is a fatal `Ddl` error. Post-create pragmas run once at the end.
pub async fn create_tables(
    target: &mut dyn Connection,
    schema: &SchemaDescriptor,
    mapper: &TypeMapper,
    profile: &TargetProfile,
) -> Result<()> {
    tracing::info!("Creating {} tables on target", schema.len());

    if profile.supports_ddl_transactions {
        create_in_transaction(target, schema, mapper, profile).await?;
    } else {
        tracing::warn!(
            "⚠ Target does not support transactional DDL: a failure will leave already-created tables in place"
        );
        create_one_by_one(target, schema, mapper, profile).await?;
    }

    apply_pragmas(target, profile).await;
    tracing::info!("✓ Created {} tables", schema.len());
    Ok(())
}

async fn create_in_transaction(
    target: &mut dyn Connection,
    schema: &SchemaDescriptor,
    mapper: &TypeMapper,
    profile: &TargetProfile,
) -> Result<()> {
    target
        .begin()
        .await
        .map_err(|e| MigrateError::ddl("(all tables)", e))?;

    for table in schema.tables() {
        let ddl = generate_create_table(table, mapper, profile);
        tracing::debug!("{}", ddl);

        if let Err(e) = target.execute_batch(&ddl).await {
            tracing::error!("✗ Failed to create table {}: {}", table.name, e);
            if let Err(rollback_err) = target.rollback().await {
                tracing::warn!("⚠ Rollback of table creation failed: {}", rollback_err);
            } else {
                tracing::info!("Rolled back creation of all tables");
            }
            return Err(MigrateError::ddl(&table.name, e));
        }
        tracing::debug!("Created table {}", table.name);
    }

    target
        .commit()
        .await
        .map_err(|e| MigrateError::ddl("(all tables)", e))
}

async fn create_one_by_one(
    target: &mut dyn Connection,
    schema: &SchemaDescriptor,
    mapper: &TypeMapper,
    profile: &TargetProfile,
) -> Result<()> {
    let mut created: Vec<&str> = Vec::new();

    for table in schema.tables() {
        let ddl = generate_create_table(table, mapper, profile);
        tracing::debug!("{}", ddl);

        if let Err(e) = target.execute_batch(&ddl).await {
            tracing::error!("✗ Failed to create table {}: {}", table.name, e);
            if !created.is_empty() {
                tracing::warn!(
                    "⚠ {} table(s) created before the failure remain on the target: {}",
                    created.len(),
                    created.join(", ")
                );
            }
            return Err(MigrateError::ddl(&table.name, e));
        }
        created.push(&table.name);
    }

    Ok(())
}

async fn apply_pragmas(target: &mut dyn Connection, profile: &TargetProfile) {
    for statement in profile.pragma_statements() {
        match target.query(&statement, &[]).await {
            Ok(_) => tracing::debug!("Applied {}", statement),
            Err(e) => tracing::warn!("⚠ Failed to apply {}: {}", statement, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_sqlite_pragmas;
    use crate::connection::{SqlValue, SqliteConnection};
    use std::collections::BTreeMap;

    fn col(name: &str, source_type: &str, max_length: i32, nullable: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.into(),
            source_type: source_type.into(),
            max_length,
            precision: 0,
            scale: 0,
            nullable,
        }
    }

    fn accounts() -> TableDescriptor {
        TableDescriptor {
            name: "accounts".into(),
            columns: vec![col("id", "int", 4, false), col("name", "varchar", 50, true)],
        }
    }

    async fn table_exists(conn: &mut SqliteConnection, name: &str) -> bool {
        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[SqlValue::from(name)],
            )
            .await
            .unwrap()
            .unwrap();
        row[0].as_i64() == Some(1)
    }

    #[test]
    fn test_generate_postgres_ddl() {
        let ddl = generate_create_table(&accounts(), &TypeMapper::default(), &TargetProfile::postgres());

        assert_eq!(
            ddl,
            "DROP TABLE IF EXISTS \"accounts\";\n\
             CREATE TABLE \"accounts\" (\n    \
             \"id\" integer NOT NULL,\n    \
             \"name\" varchar(50)\n\
             );"
        );
    }

    #[test]
    fn test_generate_sqlite_ddl_simplifies_types() {
        let profile = TargetProfile::sqlite(&BTreeMap::new());
        let ddl = generate_create_table(&accounts(), &TypeMapper::default(), &profile);

        assert!(ddl.contains("\"id\" INTEGER NOT NULL"));
        assert!(ddl.contains("\"name\" TEXT\n"));
        assert!(!ddl.contains("varchar"));
    }

    #[test]
    fn test_generate_is_idempotent() {
        let mapper = TypeMapper::default();
        let profile = TargetProfile::postgres();
        assert_eq!(
            generate_create_table(&accounts(), &mapper, &profile),
            generate_create_table(&accounts(), &mapper, &profile)
        );
    }

    #[test]
    fn test_sized_types_for_relational_target() {
        let mapper = TypeMapper::default();
        let engine = TargetEngine::RelationalFull;

        assert_eq!(column_type(&col("c", "nvarchar", 100, true), &mapper, engine), "varchar(50)");
        assert_eq!(column_type(&col("c", "nvarchar", -1, true), &mapper, engine), "varchar");
        assert_eq!(column_type(&col("c", "char", 3, true), &mapper, engine), "char(3)");
        assert_eq!(column_type(&col("c", "money", 8, true), &mapper, engine), "decimal(19,4)");

        let mut price = col("price", "decimal", 9, true);
        price.precision = 10;
        price.scale = 2;
        assert_eq!(column_type(&price, &mapper, engine), "decimal(10,2)");
        assert_eq!(column_type(&price, &mapper, TargetEngine::EmbeddedLite), "REAL");
    }

    #[test]
    fn test_nullable_controls_not_null() {
        let table = TableDescriptor {
            name: "t".into(),
            columns: vec![col("a", "int", 4, true), col("b", "int", 4, false)],
        };
        let ddl = generate_create_table(&table, &TypeMapper::default(), &TargetProfile::postgres());
        assert!(ddl.contains("\"a\" integer,\n"));
        assert!(ddl.contains("\"b\" integer NOT NULL\n"));
    }

    fn schema_with_broken_table() -> SchemaDescriptor {
        vec![
            accounts(),
            TableDescriptor {
                name: "broken".into(),
                columns: vec![col("id", "int", 4, false), col("id", "int", 4, false)],
            },
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_create_tables_applies_pragmas_after_creation() {
        let mut target = SqliteConnection::open_in_memory().unwrap();
        let schema: SchemaDescriptor = vec![accounts()].into_iter().collect();
        let profile = TargetProfile::sqlite(&default_sqlite_pragmas());

        create_tables(&mut target, &schema, &TypeMapper::default(), &profile)
            .await
            .unwrap();

        assert!(table_exists(&mut target, "accounts").await);
        let row = target.query_one("PRAGMA cache_size", &[]).await.unwrap().unwrap();
        assert_eq!(row[0].as_i64(), Some(-64000));
    }

    #[tokio::test]
    async fn test_transactional_creation_rolls_back_everything() {
        let mut target = SqliteConnection::open_in_memory().unwrap();
        let profile = TargetProfile::sqlite(&BTreeMap::new());

        let err = create_tables(
            &mut target,
            &schema_with_broken_table(),
            &TypeMapper::default(),
            &profile,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MigrateError::Ddl { ref table, .. } if table == "broken"));
        assert!(err.is_fatal());
        assert!(!table_exists(&mut target, "accounts").await);
    }

    #[tokio::test]
    async fn test_non_transactional_creation_keeps_earlier_tables() {
        let mut target = SqliteConnection::open_in_memory().unwrap();
        let profile = TargetProfile {
            supports_ddl_transactions: false,
            ..TargetProfile::sqlite(&BTreeMap::new())
        };

        let err = create_tables(
            &mut target,
            &schema_with_broken_table(),
            &TypeMapper::default(),
            &profile,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MigrateError::Ddl { .. }));
        assert!(table_exists(&mut target, "accounts").await);
        assert!(!table_exists(&mut target, "broken").await);
    }

    #[tokio::test]
    async fn test_create_tables_replaces_existing_table() {
        let mut target = SqliteConnection::open_in_memory().unwrap();
        target
            .execute_batch("CREATE TABLE accounts (legacy TEXT); INSERT INTO accounts VALUES ('old');")
            .await
            .unwrap();

        let schema: SchemaDescriptor = vec![accounts()].into_iter().collect();
        create_tables(
            &mut target,
            &schema,
            &TypeMapper::default(),
            &TargetProfile::sqlite(&BTreeMap::new()),
        )
        .await
        .unwrap();

        let row = target.query_one("SELECT COUNT(*) FROM accounts", &[]).await.unwrap().unwrap();
        assert_eq!(row[0].as_i64(), Some(0));
    }
}
