//! kepler-extract - print canonical records for a metadata file

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kepler_common::logging::{init_logging, LogConfig};
use kepler_ingest::{fgdc, make_uuid, marc, mods, GeoRecord};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process;
use tracing::{error, Level};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Fgdc,
    Marc,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    /// Raw extracted fields
    Fields,
    /// Catalog documents
    Record,
    /// MODS XML (FGDC only)
    Mods,
}

#[derive(Debug, Parser)]
#[command(name = "kepler-extract", version, about = "Extract catalog records from FGDC or MARCXML metadata")]
struct Cli {
    /// Metadata document to read
    path: PathBuf,

    /// Document format
    #[arg(short, long, value_enum, default_value = "fgdc")]
    format: Format,

    /// What to print
    #[arg(short, long, value_enum, default_value = "record")]
    output: Output,

    /// Namespace for MARC record identifiers
    #[arg(long, env = "UUID_NAMESPACE", default_value = "arrowsmith.mit.edu")]
    namespace: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let log_config = LogConfig::default()
        .with_level(level)
        .with_prefix("kepler-extract")
        .with_env()
        .unwrap_or_else(|_| LogConfig::default().with_level(level));
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = run(&cli) {
        error!(error = %e, "Extraction failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let file = File::open(&cli.path)
        .with_context(|| format!("Failed to open {}", cli.path.display()))?;
    let input = BufReader::new(file);

    match cli.format {
        Format::Fgdc => {
            let fields = fgdc::extract(input)?;
            match cli.output {
                Output::Fields => println!("{}", serde_json::to_string_pretty(&fields)?),
                Output::Record => {
                    let record = GeoRecord::from_fields(&fields)?;
                    println!("{}", serde_json::to_string_pretty(&record.to_document())?);
                },
                Output::Mods => print!("{}", mods::mods_from_fgdc(&fields)),
            }
        },
        Format::Marc => {
            if matches!(cli.output, Output::Mods) {
                anyhow::bail!("MODS output is only available for FGDC documents");
            }
            for fields in marc::records(input) {
                let fields = fields?;
                match cli.output {
                    Output::Fields => println!("{}", serde_json::to_string(&fields)?),
                    _ => {
                        let mut record = GeoRecord::from_fields(&fields)?;
                        if let Some(id) = fields.text("_marc_id") {
                            record.uuid = Some(make_uuid(id, &cli.namespace).to_string());
                        }
                        println!("{}", record.to_json());
                    },
                }
            }
        },
    }

    Ok(())
}
