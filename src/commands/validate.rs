// ABOUTME: Pre-flight validation command for migration readiness
// ABOUTME: Checks connectivity to both sides and previews the DDL a migration would issue

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::connection::{self, Connection};
use crate::migration::{describe_schema, generate_create_table, Orchestrator, SchemaDescriptor};

pub async fn validate(config: &Config) -> Result<SchemaDescriptor> {
    tracing::info!("Starting validation...");
    config.validate().context("Invalid configuration")?;

    // Step 1: Connect to source
    tracing::info!("Connecting to source database...");
    let mut source = connection::connect_source(&config.source)
        .await
        .context("Failed to connect to source database")?;

    // Step 2: Connect to target
    tracing::info!("Connecting to target database...");
    let target = connection::connect_target(&config.target)
        .await
        .context("Failed to connect to target database");
    let target = match target {
        Ok(target) => target,
        Err(e) => {
            close_quietly(source).await;
            return Err(e);
        }
    };

    // Step 3: Read the source schema
    tracing::info!("Reading source schema...");
    let schema = describe_schema(source.as_mut()).await;
    close_quietly(source).await;
    close_quietly(target).await;
    let schema = schema.context("Failed to read source schema")?;

    if schema.is_empty() {
        bail!("Source database has no tables to migrate");
    }
    tracing::info!(
        "✓ Found {} tables with {} columns",
        schema.len(),
        schema.column_count()
    );

    // Step 4: Preview the DDL
    let orchestrator = Orchestrator::from_config(config);
    for table in schema.tables() {
        tracing::info!(
            "{}",
            generate_create_table(table, orchestrator.mapper(), orchestrator.profile())
        );
    }

    tracing::info!("✅ Validation complete - ready for migration");
    Ok(schema)
}

async fn close_quietly(conn: Box<dyn Connection>) {
    if let Err(e) = conn.close().await {
        tracing::debug!("Error while closing connection: {}", e);
    }
}
