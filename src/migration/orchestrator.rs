// ABOUTME: Sequences a full migration run: connect, discover, create, transfer, verify
// ABOUTME: Per-table failures are recorded in the report while the run moves on

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::{Config, SourceConfig, TargetConfig};
use crate::connection::{self, Connection};
use crate::error::Result;
use crate::migration::ddl::create_tables;
use crate::migration::profile::TargetProfile;
use crate::migration::schema::{describe_schema, TableDescriptor};
use crate::migration::transfer::transfer;
use crate::migration::typemap::{TypeMapper, TypeMapping};
use crate::migration::verify::{check_row_counts, count_rows};
use crate::utils;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationPhase {
    Idle,
    Connecting,
    SchemaDiscovered,
    CreatingTables,
    MigratingData,
    Verifying,
    Completed,
    CompletedWithErrors,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationPhase::Idle => "idle",
            MigrationPhase::Connecting => "connecting",
            MigrationPhase::SchemaDiscovered => "schema discovered",
            MigrationPhase::CreatingTables => "creating tables",
            MigrationPhase::MigratingData => "migrating data",
            MigrationPhase::Verifying => "verifying",
            MigrationPhase::Completed => "completed",
            MigrationPhase::CompletedWithErrors => "completed with errors",
        };
        f.write_str(name)
    }
}

/// Outcome for one table. Built once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationResult {
    pub table_name: String,
    pub rows_source_count: i64,
    pub rows_target_count: i64,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub results: Vec<MigrationResult>,
    pub duration_secs: f64,
}

impl MigrationReport {
    pub fn new(results: Vec<MigrationResult>, duration: Duration) -> Self {
        Self {
            results,
            duration_secs: duration.as_secs_f64(),
        }
    }

    /// Names of tables whose migration did not succeed, in run order.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.succeeded)
            .map(|r| r.table_name.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.succeeded)
    }

    pub fn total_rows(&self) -> i64 {
        self.results.iter().map(|r| r.rows_target_count).sum()
    }

    pub fn result(&self, table: &str) -> Option<&MigrationResult> {
        self.results.iter().find(|r| r.table_name == table)
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn log_summary(&self) {
        let failed = self.failed_tables();

        tracing::info!("");
        tracing::info!("========================================");
        tracing::info!("Migration Summary");
        tracing::info!("========================================");
        tracing::info!("Total tables: {}", self.results.len());
        tracing::info!("✓ Succeeded: {}", self.results.len() - failed.len());
        tracing::info!("✗ Failed: {}", failed.len());
        tracing::info!("Rows migrated: {}", self.total_rows());
        tracing::info!(
            "Duration: {}",
            utils::format_duration(Duration::from_secs_f64(self.duration_secs))
        );
        tracing::info!("========================================");

        if !failed.is_empty() {
            tracing::error!("Failed tables: {}", failed.join(", "));
            for result in self.results.iter().filter(|r| !r.succeeded) {
                if let Some(error) = &result.error {
                    tracing::error!("  ✗ {}: {}", result.table_name, error);
                }
            }
        }
    }
}

/// Drives one migration run.
pub struct Orchestrator {
    mapper: TypeMapper,
    profile: TargetProfile,
    batch_size: usize,
    phase: MigrationPhase,
}

impl Orchestrator {
    pub fn new(mapper: TypeMapper, profile: TargetProfile, batch_size: usize) -> Self {
        Self {
            mapper,
            profile,
            batch_size,
            phase: MigrationPhase::Idle,
        }
    }

    /// Built-in type mapping plus configured overrides, and the target's profile.
    pub fn from_config(config: &Config) -> Self {
        let mut mapping = TypeMapping::sqlserver_to_postgres();
        mapping.merge(&config.migration.type_overrides);

        Self::new(
            TypeMapper::new(mapping),
            TargetProfile::for_target(&config.target),
            config.migration.batch_size,
        )
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    pub fn mapper(&self) -> &TypeMapper {
        &self.mapper
    }

    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    fn transition(&mut self, next: MigrationPhase) {
        tracing::debug!("Migration phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Connect to both databases and run the migration.
    ///
    /// A failure to connect to either side aborts the run.
    pub async fn run(
        &mut self,
        source_config: &SourceConfig,
        target_config: &TargetConfig,
    ) -> Result<MigrationReport> {
        self.transition(MigrationPhase::Connecting);

        let source = connection::connect_source(source_config).await?;
        let target = match connection::connect_target(target_config).await {
            Ok(target) => target,
            Err(e) => {
                close(source, "source").await;
                return Err(e);
            }
        };

        self.run_with(source, target).await
    }

    /// Run the migration over already-open connections, closing both at the end.
    pub async fn run_with(
        &mut self,
        mut source: Box<dyn Connection>,
        mut target: Box<dyn Connection>,
    ) -> Result<MigrationReport> {
        let outcome = self.execute(source.as_mut(), target.as_mut()).await;

        close(source, "source").await;
        close(target, "target").await;

        outcome
    }

    async fn execute(
        &mut self,
        source: &mut dyn Connection,
        target: &mut dyn Connection,
    ) -> Result<MigrationReport> {
        let started = Instant::now();
        if self.phase == MigrationPhase::Idle {
            self.transition(MigrationPhase::Connecting);
        }

        let schema = describe_schema(source).await?;
        self.transition(MigrationPhase::SchemaDiscovered);

        self.transition(MigrationPhase::CreatingTables);
        create_tables(target, &schema, &self.mapper, &self.profile).await?;

        let mut results = Vec::with_capacity(schema.len());
        for (idx, table) in schema.tables().enumerate() {
            tracing::info!("[{}/{}] Table {}", idx + 1, schema.len(), utils::sanitize_identifier(&table.name));
            results.push(self.migrate_table(source, target, table).await);
        }

        let report = MigrationReport::new(results, started.elapsed());
        self.transition(if report.is_success() {
            MigrationPhase::Completed
        } else {
            MigrationPhase::CompletedWithErrors
        });
        Ok(report)
    }

    async fn migrate_table(
        &mut self,
        source: &mut dyn Connection,
        target: &mut dyn Connection,
        table: &TableDescriptor,
    ) -> MigrationResult {
        self.transition(MigrationPhase::MigratingData);

        if let Err(e) = transfer(source, target, table, &self.profile, self.batch_size).await {
            tracing::error!("✗ {}", e.format_detailed());
            let rows_source_count = count_rows(source, &table.name).await.unwrap_or(0);
            let rows_target_count = count_rows(target, &table.name).await.unwrap_or(0);
            return MigrationResult {
                table_name: table.name.clone(),
                rows_source_count,
                rows_target_count,
                succeeded: false,
                error: Some(e.to_string()),
            };
        }

        self.transition(MigrationPhase::Verifying);
        match check_row_counts(source, target, &table.name).await {
            Ok(counts) => {
                let error = counts.mismatch_error();
                MigrationResult {
                    table_name: table.name.clone(),
                    rows_source_count: counts.source_row_count,
                    rows_target_count: counts.target_row_count,
                    succeeded: error.is_none(),
                    error: error.map(|e| e.to_string()),
                }
            }
            Err(e) => MigrationResult {
                table_name: table.name.clone(),
                rows_source_count: 0,
                rows_target_count: 0,
                succeeded: false,
                error: Some(format!("verification failed: {}", e)),
            },
        }
    }
}

async fn close(conn: Box<dyn Connection>, side: &str) {
    if let Err(e) = conn.close().await {
        tracing::warn!("⚠ Failed to close {} connection: {}", side, e);
    }
}
