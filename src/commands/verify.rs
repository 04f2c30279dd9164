// ABOUTME: Verify command implementation - Validate migrated row counts
// ABOUTME: Compares COUNT(*) of every source table against the target without migrating

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::connection::{self, Connection};
use crate::migration::{describe_schema, verify as verify_table};

/// Verify row counts between source and target databases
///
/// Lists every table in the source schema and compares its row count with
/// the same-named table on the target. A missing target table counts as a
/// mismatch.
///
/// # Returns
///
/// Names of the tables that did not match, in schema order. Empty means
/// everything matched.
///
/// # Errors
///
/// Returns an error if either database cannot be reached or the source
/// schema cannot be read.
pub async fn verify(config: &Config) -> Result<Vec<String>> {
    tracing::info!("Starting row count verification...");
    tracing::info!("");

    tracing::info!("Connecting to source database...");
    let mut source = connection::connect_source(&config.source)
        .await
        .context("Failed to connect to source database")?;

    tracing::info!("Connecting to target database...");
    let mut target = match connection::connect_target(&config.target).await {
        Ok(target) => target,
        Err(e) => {
            let _ = source.close().await;
            return Err(e).context("Failed to connect to target database");
        }
    };

    let outcome = verify_all(source.as_mut(), target.as_mut()).await;

    if let Err(e) = source.close().await {
        tracing::debug!("Error while closing source: {}", e);
    }
    if let Err(e) = target.close().await {
        tracing::debug!("Error while closing target: {}", e);
    }

    outcome
}

async fn verify_all(source: &mut dyn Connection, target: &mut dyn Connection) -> Result<Vec<String>> {
    tracing::info!("Discovering tables...");
    let schema = describe_schema(source)
        .await
        .context("Failed to list tables from source database")?;

    if schema.is_empty() {
        tracing::warn!("⚠ No tables found to verify");
        return Ok(Vec::new());
    }

    tracing::info!("Found {} tables to verify", schema.len());

    let progress = ProgressBar::new(schema.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    let mut mismatched = Vec::new();
    for name in schema.table_names() {
        if !verify_table(source, target, name).await {
            mismatched.push(name.to_string());
        }
        progress.inc(1);
        progress.set_message(format!("Verified {}", name));
    }
    progress.finish_with_message("Verification complete");

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Verification Summary");
    tracing::info!("========================================");
    tracing::info!("Total tables: {}", schema.len());
    tracing::info!("✓ Matches: {}", schema.len() - mismatched.len());
    tracing::info!("✗ Mismatches: {}", mismatched.len());
    tracing::info!("========================================");

    if !mismatched.is_empty() {
        tracing::error!("⚠ ROW COUNT MISMATCHES: {}", mismatched.join(", "));
        tracing::info!("Possible causes:");
        tracing::info!("  - The migration failed for these tables (see its report)");
        tracing::info!("  - Data was modified on either side after migration");
    }

    Ok(mismatched)
}
