// ABOUTME: CLI entry point for sqlserver-migrator
// ABOUTME: Parses commands, loads configuration, and routes to the command handlers

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sqlserver_migrator::commands::{self, MigrateOptions};
use sqlserver_migrator::MigrateError;

#[derive(Parser)]
#[command(name = "sqlserver-migrator")]
#[command(about = "Migrate a SQL Server schema and its data to PostgreSQL or SQLite", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct ConfigArgs {
    /// Path to a TOML configuration file (defaults to environment variables and .env)
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every source table's schema and data to the target
    Migrate {
        #[command(flatten)]
        config: ConfigArgs,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Rows per insert batch (overrides MIGRATION_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Write a JSON report of the run to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Check connectivity and preview the tables that would be created
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Compare row counts of every source table against the target
    Verify {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // A missing .env file is fine; variables may come from the environment
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        // Driver errors keep their detail (e.g. the PostgreSQL server message) in the cause chain
        if let Some(err) = e.downcast_ref::<MigrateError>() {
            tracing::error!("{}", err.format_detailed());
        }
        return Err(e);
    }
    Ok(())
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Migrate {
            config,
            yes,
            batch_size,
            report,
        } => {
            let config = commands::load_config(config.config_path.as_deref())?;
            let report = commands::migrate(
                config,
                MigrateOptions {
                    skip_confirmation: yes,
                    batch_size,
                    report_path: report,
                },
            )
            .await?;

            if !report.is_success() {
                anyhow::bail!(
                    "Migration finished with {} failed table(s): {}",
                    report.failed_tables().len(),
                    report.failed_tables().join(", ")
                );
            }
            Ok(())
        }
        Commands::Validate { config } => {
            let config = commands::load_config(config.config_path.as_deref())?;
            commands::validate(&config).await?;
            Ok(())
        }
        Commands::Verify { config } => {
            let config = commands::load_config(config.config_path.as_deref())?;
            let mismatched = commands::verify(&config).await?;
            if !mismatched.is_empty() {
                anyhow::bail!("{} table(s) failed verification", mismatched.len());
            }
            Ok(())
        }
    }
}
