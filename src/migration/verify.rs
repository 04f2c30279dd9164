// ABOUTME: Post-transfer verification by row counts
// ABOUTME: Compares COUNT(*) on source and target; a mismatch is reported, not raised

use crate::connection::Connection;
use crate::error::{MigrateError, Result};

/// Row counts of one table on both sides of the migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCountResult {
    pub table: String,
    pub source_row_count: i64,
    pub target_row_count: i64,
}

impl RowCountResult {
    /// Returns true if both sides hold the same number of rows
    pub fn matches(&self) -> bool {
        self.source_row_count == self.target_row_count
    }

    /// The mismatch as an error value, for recording in a report.
    pub fn mismatch_error(&self) -> Option<MigrateError> {
        (!self.matches()).then(|| MigrateError::VerificationMismatch {
            table: self.table.clone(),
            source_rows: self.source_row_count,
            target_rows: self.target_row_count,
        })
    }
}

/// Count the rows of `table` on `conn`.
pub async fn count_rows(conn: &mut dyn Connection, table: &str) -> Result<i64> {
    let query = format!(
        "SELECT COUNT(*) FROM {}",
        conn.dialect().quote_identifier(table)
    );
    let row = conn.query_one(&query, &[]).await?;

    row.and_then(|r| r.first().and_then(|v| v.as_i64()))
        .ok_or_else(|| MigrateError::value(table, "COUNT(*) returned no integer"))
}

/// Count `table` on both sides.
pub async fn compare_row_counts(
    source: &mut dyn Connection,
    target: &mut dyn Connection,
    table: &str,
) -> Result<RowCountResult> {
    tracing::debug!("Comparing row counts for {}", table);

    let source_row_count = count_rows(source, table).await?;
    let target_row_count = count_rows(target, table).await?;

    Ok(RowCountResult {
        table: table.to_string(),
        source_row_count,
        target_row_count,
    })
}

/// Count `table` on both sides and log the outcome.
///
/// This is the one place verification results are reported. A count that
/// cannot be taken is logged and returned as the error.
pub async fn check_row_counts(
    source: &mut dyn Connection,
    target: &mut dyn Connection,
    table: &str,
) -> Result<RowCountResult> {
    let outcome = compare_row_counts(source, target, table).await;
    match &outcome {
        Ok(result) if result.matches() => {
            tracing::info!("✓ Verified {}: {} rows", table, result.source_row_count);
        }
        Ok(result) => {
            tracing::error!(
                "✗ Row count mismatch for {}: source={}, target={}",
                table,
                result.source_row_count,
                result.target_row_count
            );
        }
        Err(e) => tracing::error!("✗ Could not verify {}: {}", table, e),
    }
    outcome
}

/// Whether `table` holds the same number of rows on both sides.
///
/// Never fails: a count that cannot be taken is treated as a mismatch.
pub async fn verify(source: &mut dyn Connection, target: &mut dyn Connection, table: &str) -> bool {
    check_row_counts(source, target, table)
        .await
        .is_ok_and(|result| result.matches())
}
