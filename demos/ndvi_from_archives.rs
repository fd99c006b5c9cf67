use anyhow::Result;
use std::env;
use std::path::PathBuf;

extern crate sentinel_ndvi;
use sentinel_ndvi::config::{pipeline_toml, ExistingOutput, PipelineConfig};
use sentinel_ndvi::pipeline::Pipeline;

/// Rerun extraction, mosaicking, clipping and NDVI on archives that were already downloaded
/// into `<output_root>/sentinel_imagery`.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = PipelineConfig::from_template(&pipeline_toml())?;
    if let Some(root) = env::args().nth(1) {
        config.output_root = PathBuf::from(root);
    }
    config.existing_output = ExistingOutput::Clear;

    let pipeline = Pipeline::new(config)?;
    let aoi = pipeline.prepare_aoi()?;
    let extraction = pipeline.extract(&[])?;
    let bands = pipeline.mosaic_bands(&extraction)?;
    let clipped = pipeline.clip_bands(&aoi, &bands)?;

    for path in pipeline.generate_indices(&clipped)? {
        println!("{}", path.display());
    }

    Ok(())
}
