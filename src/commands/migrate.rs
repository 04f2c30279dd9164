// ABOUTME: Migrate command implementation - full schema and data copy
// ABOUTME: Confirms the destructive table drop, runs the orchestrator, and writes the report

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};

use crate::config::{Config, SourceConfig, TargetConfig};
use crate::migration::{MigrationReport, Orchestrator};

/// Command-line adjustments layered over the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Skip the drop-tables confirmation prompt
    pub skip_confirmation: bool,
    /// Replace the configured batch size
    pub batch_size: Option<usize>,
    /// Write the JSON report here when set
    pub report_path: Option<PathBuf>,
}

/// Run one full migration from the configured source to the configured target
///
/// Steps:
/// 1. Warns that same-named target tables will be dropped and asks for confirmation
/// 2. Connects to both databases
/// 3. Reads the source schema and creates every table on the target
/// 4. Copies and verifies each table in turn
/// 5. Logs a summary and optionally writes a JSON report
///
/// # Returns
///
/// The report of the run. Table-level failures are in the report, not in the error.
///
/// # Errors
///
/// Returns an error if the user declines, a connection cannot be opened, the
/// schema cannot be read, or table creation fails.
pub async fn migrate(mut config: Config, options: MigrateOptions) -> Result<MigrationReport> {
    if let Some(batch_size) = options.batch_size {
        config.migration.batch_size = batch_size;
    }
    config.validate().context("Invalid configuration")?;

    tracing::info!("Starting migration...");
    tracing::info!("  Source: {}", describe_source(&config.source));
    tracing::info!("  Target: {}", describe_target(&config.target));
    tracing::info!("  Batch size: {}", config.migration.batch_size);

    if !options.skip_confirmation {
        confirm_destructive_run(&config.target)?;
    }

    let mut orchestrator = Orchestrator::from_config(&config);
    if !orchestrator.profile().supports_ddl_transactions {
        tracing::warn!(
            "⚠ This target creates tables without a transaction: a failed run can leave some tables behind"
        );
    }

    let report = orchestrator
        .run(&config.source, &config.target)
        .await
        .context("Migration aborted")?;

    report.log_summary();

    if let Some(path) = &options.report_path {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("✓ Report written to {}", path.display());
    }

    if report.is_success() {
        tracing::info!("✅ Migration complete");
    } else {
        tracing::info!("");
        tracing::info!("Re-run after fixing the failed tables listed above.");
    }

    Ok(report)
}

fn confirm_destructive_run(target: &TargetConfig) -> Result<()> {
    tracing::warn!(
        "⚠ Tables on {} that share a name with a source table will be DROPPED and recreated",
        describe_target(target)
    );

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Proceed with the migration?")
        .default(false)
        .interact()
        .context("Failed to get confirmation")?;

    if !confirmed {
        tracing::warn!("⚠ User cancelled operation");
        bail!("Migration cancelled by user");
    }
    Ok(())
}

pub(crate) fn describe_source(source: &SourceConfig) -> String {
    match source {
        SourceConfig::SqlServer(mssql) => format!(
            "SQL Server {}:{}/{} (user {})",
            mssql.host, mssql.port, mssql.database, mssql.user
        ),
        SourceConfig::Sqlite(sqlite) => format!("SQLite {}", sqlite.path.display()),
    }
}

pub(crate) fn describe_target(target: &TargetConfig) -> String {
    match target {
        TargetConfig::Postgres(pg) => format!(
            "PostgreSQL {}:{}/{} (user {})",
            pg.host, pg.port, pg.database, pg.user
        ),
        TargetConfig::Sqlite(sqlite) => format!("SQLite {}", sqlite.path.display()),
    }
}
