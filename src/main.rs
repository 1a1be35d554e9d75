//! # netbox-ssot
//!
//! Batch entry point: load configuration, sync every source into NetBox
//! once, write metrics and exit non-zero if anything was left undone.

use anyhow::{Context, Result};
use clap::Parser;
use netbox_ssot::config::Config;
use netbox_ssot::constants::DEFAULT_CONFIG_PATH;
use netbox_ssot::observability::{init_logging, metrics};
use netbox_ssot::sync;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "netbox-ssot", version, about = "Sync infrastructure inventories into NetBox")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Write Prometheus metrics to this file at the end of the run
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Write the run report as JSON to this file
    #[arg(long)]
    report_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.logger.level = level;
    }
    init_logging(&config.logger.level, config.logger.format)?;

    // Configure rustls crypto provider before any HTTP client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("BUILD_GIT_HASH"),
        built_at = env!("BUILD_DATETIME"),
        "Starting netbox-ssot"
    );
    metrics::register_metrics()?;

    let report = sync::run_sync(&config).await?;

    if let Some(path) = cli.metrics_file.as_ref().or(config.metrics.textfile.as_ref()) {
        metrics::write_textfile(path)?;
        info!(path = %path.display(), "Wrote metrics");
    }
    if let Some(path) = &cli.report_file {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    Ok(report.is_success())
}
