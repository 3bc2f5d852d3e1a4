//! enumsql - Replicates enums to SQL Server lookup tables
//!
//! Every configured enum owns one table. A run creates missing tables, checks
//! the shape of existing ones, and brings their rows in line with the enum
//! members: new values are inserted, changed ones updated, and values removed
//! from code are handled by the enum's deletion policy.
//!
//! # Usage
//!
//! ```bash
//! # Update every configured database
//! enumsql -c enumsql.yaml
//!
//! # Update an extra database as well, one at a time
//! enumsql -c enumsql.yaml --conn sqlserver://deploy@db03/Shop --no-parallel
//!
//! # List enums and their tables
//! enumsql -c enumsql.yaml preview
//!
//! # Validate configuration
//! enumsql -c enumsql.yaml validate
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use enumsql::descriptor::EnumDescriptor;
use enumsql::report::TracingReporter;
use enumsql::sqlserver::SqlServerConnectionFactory;
use enumsql::sync::{DatabaseReport, Replicator};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::RunConfig;

#[derive(Parser)]
#[command(name = "enumsql")]
#[command(version, about = "Keeps SQL Server lookup tables in step with enums")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "enumsql.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Additional database connection URL (repeatable)
    #[arg(long = "conn", value_name = "URL")]
    connections: Vec<String>,

    /// Update databases one at a time, stopping at the first failure
    #[arg(long)]
    no_parallel: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Update every database (default)
    Run,
    /// List configured enums and their target tables
    Preview,
    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = RunConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if cli.no_parallel {
        config.settings.parallel = false;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, &cli.connections).await,
        Commands::Preview => preview(&config),
        Commands::Validate => validate(&config, &cli.connections),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn run(config: RunConfig, extra: &[String]) -> Result<()> {
    let descriptors = config.descriptors()?;
    let databases = config.connection_configs(extra);
    if databases.is_empty() {
        bail!("No databases configured; add `databases` or pass --conn");
    }

    info!(
        "Replicating {} enum(s) to {} database(s)",
        descriptors.len(),
        databases.len()
    );
    let started = Instant::now();

    let replicator = Replicator::new(descriptors)
        .with_reporter(Arc::new(TracingReporter))
        .with_options(config.sync_options());
    let reports = replicator
        .update_databases(Arc::new(SqlServerConnectionFactory), databases)
        .await;

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    for report in &reports {
        log_report(report);
    }
    info!(
        "Finished {} database(s) in {:.1}s",
        reports.len(),
        started.elapsed().as_secs_f64()
    );

    if failed > 0 {
        bail!("{} of {} database(s) failed", failed, reports.len());
    }
    Ok(())
}

fn log_report(report: &DatabaseReport) {
    if let Some(e) = &report.connect_error {
        error!("{}: could not connect: {}", report.target, e);
        return;
    }

    let failed: Vec<&str> = report
        .tables
        .iter()
        .filter(|t| t.result.is_err())
        .map(|t| t.table.as_str())
        .collect();
    if failed.is_empty() {
        info!("{}: {}", report.target, report.totals());
    } else {
        error!(
            "{}: {} table(s) failed ({}); {}",
            report.target,
            failed.len(),
            failed.join(", "),
            report.totals()
        );
    }
}

fn preview(config: &RunConfig) -> Result<()> {
    let descriptors = config.descriptors()?;

    println!("{:<32} {:<32} {:<14} VALUES", "ENUM", "TABLE", "ON DELETE");
    for d in &descriptors {
        println!(
            "{:<32} {:<32} {:<14} {}",
            d.enum_name(),
            d.qualified_name(),
            d.deletion_policy().to_string(),
            d.values().len()
        );
    }
    println!();
    for d in &descriptors {
        print_columns(d);
    }
    Ok(())
}

fn print_columns(d: &EnumDescriptor) {
    let columns: Vec<String> = d
        .columns()
        .iter()
        .map(|c| format!("{} {}", c.name, c.sized_sql_type()))
        .collect();
    println!("{}: {}", d.qualified_name(), columns.join(", "));
}

fn validate(config: &RunConfig, extra: &[String]) -> Result<()> {
    let descriptors = config.descriptors()?;
    let databases = config.connection_configs(extra);

    println!("✓ Configuration valid!\n");

    println!("Databases:");
    if databases.is_empty() {
        println!("  (none)");
    }
    for db in &databases {
        println!("  - {}", db.redacted_url());
    }
    println!();

    let values: usize = descriptors.iter().map(|d| d.values().len()).sum();
    println!("Enums: {} ({} values)", descriptors.len(), values);
    println!();

    println!("Settings:");
    println!(
        "  Parallel: {}",
        if config.settings.parallel {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Continue on table error: {}",
        config.settings.continue_on_table_error
    );
    match config.settings.table_timeout_ms {
        Some(ms) => println!("  Table timeout: {}ms", ms),
        None => println!("  Table timeout: none"),
    }
    println!(
        "  Connection timeout: {}ms",
        config.settings.connect_timeout_ms
    );

    Ok(())
}
