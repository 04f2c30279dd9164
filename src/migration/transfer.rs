// ABOUTME: Copies one table's rows from source to target in bounded batches
// ABOUTME: Writes happen inside one transaction per table when the target supports it

use indicatif::{ProgressBar, ProgressStyle};

use crate::config::DEFAULT_BATCH_SIZE;
use crate::connection::{Connection, Row, SqlValue};
use crate::error::{MigrateError, Result};
use crate::migration::profile::TargetProfile;
use crate::migration::schema::TableDescriptor;
use crate::migration::verify::count_rows;

/// Row totals for one transferred table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub rows_read: u64,
    pub rows_written: u64,
}

/// Copy every row of `table` from `source` to `target`.
///
/// An empty source table is skipped without issuing any INSERT. Failures are
/// wrapped in a `Transfer` error after the table's writes are rolled back.
pub async fn transfer(
    source: &mut dyn Connection,
    target: &mut dyn Connection,
    table: &TableDescriptor,
    profile: &TargetProfile,
    batch_size: usize,
) -> Result<TransferStats> {
    let batch_size = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };

    let total = count_rows(source, &table.name)
        .await
        .map_err(|e| MigrateError::transfer(&table.name, e))?;
    if total == 0 {
        tracing::info!("Skipping empty table {}", table.name);
        return Ok(TransferStats::default());
    }

    tracing::info!("Migrating table {} ({} rows)", table.name, total);

    let source_dialect = source.dialect();
    let select = format!(
        "SELECT {} FROM {}",
        table
            .column_names()
            .map(|c| source_dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", "),
        source_dialect.quote_identifier(&table.name)
    );
    let mut rows = source
        .query(&select, &[])
        .await
        .map_err(|e| MigrateError::transfer(&table.name, e))?;
    let rows_read = rows.len() as u64;

    normalize_rows(&mut rows);
    let insert = insert_statement(table, profile);

    let progress = ProgressBar::new(rows_read);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    progress.set_message(table.name.clone());

    let use_transaction = profile.supports_data_transactions;
    if use_transaction {
        target
            .begin()
            .await
            .map_err(|e| MigrateError::transfer(&table.name, e))?;
    }

    let written = match write_batches(target, &insert, table, &rows, batch_size, &progress).await {
        Ok(written) => written,
        Err(e) => {
            progress.abandon_with_message(format!("{} failed", table.name));
            if use_transaction {
                match target.rollback().await {
                    Ok(()) => tracing::info!("Rolled back partial writes for {}", table.name),
                    Err(rollback_err) => {
                        tracing::warn!("⚠ Rollback failed for {}: {}", table.name, rollback_err)
                    }
                }
            }
            return Err(MigrateError::transfer(&table.name, e));
        }
    };

    if use_transaction {
        if let Err(e) = target.commit().await {
            progress.abandon_with_message(format!("{} failed", table.name));
            // A failed COMMIT may leave the transaction open on some engines
            let _ = target.rollback().await;
            return Err(MigrateError::transfer(&table.name, e));
        }
    }

    progress.finish_and_clear();
    tracing::info!("✓ Migrated {} rows for table {}", written, table.name);

    Ok(TransferStats {
        rows_read,
        rows_written: written,
    })
}

/// Positional INSERT using the same column order as the SELECT.
pub fn insert_statement(table: &TableDescriptor, profile: &TargetProfile) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        profile.quote(&table.name),
        table
            .column_names()
            .map(|c| profile.quote(c))
            .collect::<Vec<_>>()
            .join(", "),
        profile.placeholders(table.columns.len())
    )
}

/// Rewrite empty strings to NULL in place.
fn normalize_rows(rows: &mut [Row]) {
    for value in rows.iter_mut().flat_map(|row| row.iter_mut()) {
        *value = std::mem::replace(value, SqlValue::Null).normalize_empty();
    }
}

async fn write_batches(
    target: &mut dyn Connection,
    insert: &str,
    table: &TableDescriptor,
    rows: &[Row],
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<u64> {
    let mut written = 0u64;

    for (batch_no, batch) in rows.chunks(batch_size).enumerate() {
        for row in batch {
            if row.len() != table.columns.len() {
                return Err(MigrateError::value(
                    &table.name,
                    format!(
                        "row has {} values but the table has {} columns",
                        row.len(),
                        table.columns.len()
                    ),
                ));
            }
            written += target.execute(insert, row).await?;
        }

        progress.inc(batch.len() as u64);
        tracing::debug!(
            "Table {}: batch {} done ({} rows written)",
            table.name,
            batch_no + 1,
            written
        );
    }

    Ok(written)
}
