//! kepler - operator CLI for the ingest engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kepler_common::logging::{init_logging, LogConfig};
use kepler_ingest::make_uuid;
use kepler_server::{
    config::Config,
    db::{self, DbConfig},
    ingest::{IngestService, ReconcileScheduler},
    ledger::PgLedger,
    services::Services,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

/// Item URI used for MARC loads when none is given
const MARC_RECORDS_KEY: &str = "marc_records";

#[derive(Debug, Parser)]
#[command(name = "kepler", version, about = "Publish geospatial data to GeoServer, DSpace and Solr")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,

    /// Submit a package and run its pipeline
    Ingest {
        /// Item URI (a UUID). Defaults to the shared MARC item for marc loads.
        #[arg(long)]
        uri: Option<String>,

        /// Payload type: shapefile, geotiff or marc
        #[arg(long = "type", value_name = "TYPE")]
        payload: String,

        /// Zipped bag, or a MARCXML file for marc loads
        #[arg(long)]
        archive: PathBuf,
    },

    /// Run one reconciliation pass
    Reconcile,

    /// Reconcile on an interval until interrupted
    Worker,

    /// Show an item's effective job status
    Status {
        #[arg(long)]
        uri: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let log_config = LogConfig::default()
        .with_level(level)
        .with_prefix("kepler")
        .with_env()
        .unwrap_or_else(|_| LogConfig::default().with_level(level));
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = run(cli).await {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let pool = db::create_pool(&DbConfig::from(&config.database)).await?;

    if let Command::Migrate = cli.command {
        return Ok(db::run_migrations(&pool).await?);
    }

    let service = Arc::new(IngestService::new(
        Arc::new(PgLedger::new(pool)),
        Services::from_config(&config)?,
        config.ingest.uuid_namespace.clone(),
    ));

    match cli.command {
        Command::Migrate => {},
        Command::Ingest {
            uri,
            payload,
            archive,
        } => {
            let uri = match uri {
                Some(uri) => uri,
                None if payload.eq_ignore_ascii_case("marc") => {
                    make_uuid(MARC_RECORDS_KEY, &config.ingest.uuid_namespace).to_string()
                },
                None => anyhow::bail!("--uri is required for {} packages", payload),
            };
            let job = service.submit(&uri, &payload, &archive).await?;
            println!("{} {} {}", job.id, uri, job.status);
        },
        Command::Reconcile => {
            let report = service.reconcile().await?;
            println!(
                "examined={} completed={} failed={} converging={} errors={}",
                report.examined, report.completed, report.failed, report.converging, report.errors
            );
        },
        Command::Worker => {
            let cancel = CancellationToken::new();
            let handle = ReconcileScheduler::new(service, config.ingest.reconcile_interval())
                .spawn(cancel.clone());

            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
            cancel.cancel();
            handle.await?;
        },
        Command::Status { uri } => match service.effective_status(&uri).await? {
            Some((item, job)) => {
                println!("{} {} {}", item.uri, job.status, job.time.to_rfc3339());
                if let Some(message) = &job.error_message {
                    println!("{}", message);
                }
            },
            None => anyhow::bail!("No jobs recorded for {}", uri),
        },
    }

    Ok(())
}
