use super::{read_band_f32, write_geotiff_f32};
use crate::error::PipelineError;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// `(NIR - RED) / (NIR + RED)` per pixel.
///
/// A zero denominator is not an error: 0/0 gives NaN and x/0 gives an infinity. Both are
/// passed through so that nodata regions stay distinguishable in the output.
pub fn ndvi(red: &[f32], nir: &[f32]) -> Vec<f32> {
    red.iter()
        .zip(nir.iter())
        .map(|(&red, &nir)| (nir - red) / (nir + red))
        .collect()
}

/// Compute NDVI from two rasters on the same grid and write it as Float32 GeoTIFF.
///
/// Georeferencing and nodata are copied from the red raster. Only the pixel dimensions
/// of the two inputs are compared.
pub fn generate_ndvi(red_path: &Path, nir_path: &Path, output: &Path) -> Result<PathBuf> {
    log::info!(
        "Generating NDVI from {} and {}",
        red_path.display(),
        nir_path.display()
    );
    let (red, grid) = read_band_f32(red_path)?;
    let (nir, nir_grid) = read_band_f32(nir_path)?;
    if grid.size != nir_grid.size {
        return Err(PipelineError::GridMismatch {
            red: grid.size,
            nir: nir_grid.size,
        }
        .into());
    }

    let values = ndvi(&red, &nir);
    write_geotiff_f32(output, &grid, values)?;
    log::info!("Wrote {}", output.display());
    Ok(output.to_path_buf())
}
