//! Catalog Harvester command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use catalog_harvester::application::HarvestPipeline;
use catalog_harvester::infrastructure::config::{AppConfig, ConfigManager};
use catalog_harvester::infrastructure::logging;

#[derive(Parser)]
#[command(name = "catalog-harvester")]
#[command(about = "Crawl a store catalog and import the products into an ingestion API")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true, env = "CATALOG_HARVESTER_CONFIG")]
    config: Option<PathBuf>,

    /// Log what would be sent instead of calling the ingestion API
    #[arg(long, global = true)]
    dry_run: bool,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every category, extract products and write the output files
    Harvest,

    /// Validate and send records from a JSON file or directory of files
    Dispatch {
        /// File or directory to import (defaults to the harvest output file)
        path: Option<PathBuf>,
    },

    /// Replay failed batches one record at a time
    Reconcile,

    /// Harvest, dispatch and reconcile in one go
    Run {
        /// Leave failed batches for a later `reconcile`
        #[arg(long)]
        skip_reconcile: bool,
    },

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn config_manager(path: Option<PathBuf>) -> Result<ConfigManager> {
    match path {
        Some(path) => Ok(ConfigManager::with_path(path)),
        None => ConfigManager::new(),
    }
}

async fn load_config(cli: &Cli) -> Result<AppConfig> {
    let manager = config_manager(cli.config.clone())?;
    let mut config = manager.load_config().await?;
    config.apply_env_overrides();
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    Ok(config)
}

/// Cancel `token` on the first ctrl-c
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work and stopping");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { force } = &cli.command {
        let manager = config_manager(cli.config.clone())?;
        manager.initialize(*force).await?;
        println!("Configuration written to {}", manager.config_path().display());
        return Ok(());
    }

    let config = load_config(&cli).await?;
    logging::init_logging_with_config(&config.logging).context("Failed to initialize logging")?;
    logging::log_system_info();

    let reconcile_after_dispatch = config.delivery.reconcile_after_dispatch;
    let products_path = config.products_path();
    let pipeline = HarvestPipeline::from_config(config, cli.dry_run)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Harvest => {
            let report = pipeline.harvest(&cancel).await?;
            info!(
                "Harvested {} records, {} discarded {:?}",
                report.records.len(),
                report.progress.discarded,
                report.discards_by_reason
            );
        }
        Commands::Dispatch { path } => {
            let path = path.unwrap_or(products_path);
            let report = pipeline.import(&path).await?;
            info!(
                "Import finished: {} valid, {} invalid, {} delivered, {} failed batches",
                report.valid,
                report.invalid,
                report.dispatch.delivered_count,
                report.dispatch.failed_batches.len()
            );
        }
        Commands::Reconcile => {
            let report = pipeline.reconcile().await?;
            info!(
                "Reconcile finished: {} recovered, {} still failing",
                report.delivered(),
                report.residual()
            );
        }
        Commands::Run { skip_reconcile } => {
            let summary = pipeline
                .run(&cancel, reconcile_after_dispatch && !skip_reconcile)
                .await?;
            summary.log();
            if !summary.all_ok() {
                error!("Pipeline finished with errors");
                anyhow::bail!("one or more pipeline steps failed");
            }
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}
