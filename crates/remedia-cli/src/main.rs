mod csv_io;
mod display;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use remedia_core::PipelineConfig;
use remedia_pipeline::Pipeline;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "remedia")]
#[command(about = "Flag and remediate user records against an output contract")]
#[command(version)]
struct Cli {
    /// Pipeline config (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true, env = "REMEDIA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flag and remediate a CSV file
    Run {
        /// Input CSV with a header row
        input: PathBuf,

        /// Write contracted records here instead of printing them
        #[arg(long)]
        out: Option<PathBuf>,

        /// Write rejected records here instead of printing them
        #[arg(long)]
        rejected: Option<PathBuf>,

        /// Write the anomaly log here
        #[arg(long)]
        anomalies: Option<PathBuf>,
    },

    /// Print the flagged view of a CSV file
    Flag {
        /// Input CSV with a header row
        input: PathBuf,
    },

    /// Print the contracted output schema for the active config
    Schema,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let pipeline = Pipeline::new(config).context("invalid pipeline config")?;

    match cli.command {
        Command::Run {
            input,
            out,
            rejected,
            anomalies,
        } => {
            let raw = csv_io::read_csv(&input)?;
            let output = pipeline
                .run(&raw)
                .with_context(|| format!("remediating {}", input.display()))?;
            display::print_summary(&output.summary());

            match out {
                Some(path) => csv_io::write_csv(&path, &output.contracted)?,
                None => display::print_table("contracted", &output.contracted)?,
            }
            match rejected {
                Some(path) => csv_io::write_csv(&path, &output.rejected)?,
                None => display::print_rejected_cards(&output.rejected)?,
            }
            if let Some(path) = anomalies {
                csv_io::write_csv(&path, &output.anomalies)?;
            }
        }
        Command::Flag { input } => {
            let raw = csv_io::read_csv(&input)?;
            let flagged = pipeline
                .flagger()
                .flag(&raw)
                .with_context(|| format!("flagging {}", input.display()))?;
            display::print_table("flagged", &flagged)?;
        }
        Command::Schema => {
            display::print_schema(&pipeline.remediator().contract().schema());
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = PipelineConfig::from_toml(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded pipeline config");
    Ok(config)
}
