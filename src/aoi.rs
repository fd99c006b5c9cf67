//! Area of interest preparation: shapefile to GeoJSON, GeoJSON to WKT.
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use anyhow::Result;
use gdal::{Dataset, DriverManager};
use geojson::GeoJson;
use std::fs;
use std::path::{Path, PathBuf};
use wkt::ToWkt;

/// The area of interest in the two forms later stages need.
#[derive(Debug, Clone)]
pub struct Aoi {
    /// Shapefile the AOI was read from; `gdalwarp` uses it as the cutline.
    pub shapefile: PathBuf,
    pub geojson: PathBuf,
    pub wkt: String,
}

pub fn prepare(config: &PipelineConfig) -> Result<Aoi> {
    log::info!("Converting shapefile to GeoJSON");
    let geojson = convert_to_geojson(&config.aoi_path, &config.geojson_path())?;
    let wkt = read_geojson_wkt(&geojson)?;
    log::debug!("AOI: {}", wkt);
    Ok(Aoi {
        shapefile: config.aoi_path.clone(),
        geojson,
        wkt,
    })
}

/// Re-serialize a vector dataset with the GeoJSON driver. The geometry is copied unaltered.
pub fn convert_to_geojson(shapefile: &Path, geojson: &Path) -> Result<PathBuf> {
    let source = Dataset::open(shapefile)?;
    let driver = DriverManager::get_driver_by_name("GeoJSON")?;

    if let Some(parent) = geojson.parent() {
        fs::create_dir_all(parent)?;
    }
    // The GeoJSON driver refuses to write over an existing file
    if geojson.exists() {
        fs::remove_file(geojson)?;
    }

    // Dropping the copy flushes it to disk
    let copy = source.create_copy(&driver, geojson, &[])?;
    drop(copy);

    log::info!("Wrote {}", geojson.display());
    Ok(geojson.to_path_buf())
}

/// WKT of the AOI geometry. For a collection the first feature is used.
pub fn read_geojson_wkt(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)?;
    let geojson: GeoJson = content.parse()?;

    let geometry = match geojson {
        GeoJson::Geometry(geometry) => Some(geometry),
        GeoJson::Feature(feature) => feature.geometry,
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .next()
            .and_then(|feature| feature.geometry),
    }
    .ok_or_else(|| PipelineError::EmptyAoi(path.to_path_buf()))?;

    let geometry: geo_types::Geometry<f64> = geometry.try_into()?;
    Ok(geometry.wkt_string())
}
