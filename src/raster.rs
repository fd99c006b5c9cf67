//! Raster stages: mosaicking, clipping and index generation. GDAL does the heavy lifting.
pub mod clip;
pub mod mosaic;
pub mod ndvi;

use anyhow::Result;
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, GeoTransform};
use std::path::Path;

/// Pixel grid and georeferencing shared by a raster and anything derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub size: (usize, usize),
    pub geo_transform: Option<GeoTransform>,
    pub projection: String,
    pub nodata: Option<f64>,
}

impl RasterGrid {
    pub fn of(dataset: &Dataset) -> Result<Self> {
        let nodata = dataset.rasterband(1)?.no_data_value();
        Ok(Self {
            size: dataset.raster_size(),
            geo_transform: dataset.geo_transform().ok(),
            projection: dataset.projection(),
            nodata,
        })
    }
}

/// Band 1 of `path` as f32, along with its grid.
pub fn read_band_f32(path: &Path) -> Result<(Vec<f32>, RasterGrid)> {
    let dataset = Dataset::open(path)?;
    let grid = RasterGrid::of(&dataset)?;
    let band = dataset.rasterband(1)?;
    let buffer = band.read_as::<f32>((0, 0), grid.size, grid.size, None)?;
    Ok((buffer.data, grid))
}

/// Write a single-band Float32 GeoTIFF on `grid`.
pub fn write_geotiff_f32(path: &Path, grid: &RasterGrid, data: Vec<f32>) -> Result<()> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (width, height) = grid.size;

    let mut dataset =
        driver.create_with_band_type::<f32, _>(path, width as isize, height as isize, 1)?;
    if let Some(transform) = grid.geo_transform.as_ref() {
        dataset.set_geo_transform(transform)?;
    }
    if !grid.projection.is_empty() {
        dataset.set_projection(&grid.projection)?;
    }

    let mut band = dataset.rasterband(1)?;
    let buffer = Buffer::new((width, height), data);
    band.write((0, 0), (width, height), &buffer)?;
    if grid.nodata.is_some() {
        band.set_no_data_value(grid.nodata)?;
    }
    Ok(())
}
