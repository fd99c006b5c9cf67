use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use sentinel_ndvi::config::{pipeline_toml, ExistingOutput, PipelineConfig};
use sentinel_ndvi::pipeline::{Pipeline, RunOptions};

const DEFAULT_CONFIG: &str = "./inputs/pipeline.toml";

/// Sentinel-2 NDVI for an area of interest.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Pipeline configuration. The built-in defaults are used when the default file is absent.
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// What to do with destinations that already have contents.
    #[arg(long, value_enum)]
    existing_output: Option<Policy>,

    /// Use archives already in the imagery directory instead of querying the catalog.
    #[arg(long)]
    skip_download: bool,

    /// Write the default configuration to this path and exit.
    #[arg(long)]
    write_config: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Policy {
    Fail,
    Clear,
    Keep,
}

impl From<Policy> for ExistingOutput {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Fail => ExistingOutput::Fail,
            Policy::Clear => ExistingOutput::Clear,
            Policy::Keep => ExistingOutput::Keep,
        }
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    if !cli.config.exists() && cli.config == PathBuf::from(DEFAULT_CONFIG) {
        log::info!("{} not found, using built-in defaults", DEFAULT_CONFIG);
        return PipelineConfig::from_template(&pipeline_toml());
    }
    PipelineConfig::read(&cli.config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Some(path) = cli.write_config.as_ref() {
        PipelineConfig::from_template(&pipeline_toml())?.write(path)?;
        log::info!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = load_config(&cli)?;
    if let Some(policy) = cli.existing_output {
        config.existing_output = policy.into();
    }

    let pipeline = Pipeline::new(config)?;
    let report = pipeline
        .run(&RunOptions {
            skip_download: cli.skip_download,
        })
        .await?;

    log::info!("Downloaded {} archives", report.downloads.len());
    for band in report.bands.iter() {
        log::info!(
            "{}: {} tiles, mosaic {}",
            band.collection.band,
            band.collection.tiles.len(),
            band.mosaic.display()
        );
    }
    for index in report.indices.iter() {
        log::info!("NDVI written to {}", index.display());
    }

    Ok(())
}
