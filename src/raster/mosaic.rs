use crate::bands::BandCollection;
use crate::error::PipelineError;
use anyhow::{Context, Result};
use gdal::programs::raster::build_vrt;
use gdal::{Dataset, DriverManager};
use std::path::{Path, PathBuf};

pub const MOSAIC_FILE: &str = "mosaic.tiff";

/// Merge every tile of a band into `<band dir>/mosaic.tiff`.
pub fn mosaic(collection: &BandCollection) -> Result<PathBuf> {
    log::info!("Mosaic-ing band {}", collection.band);
    if collection.tiles.is_empty() {
        return Err(PipelineError::NoTiles(collection.band.clone()).into());
    }
    let output = collection.dir.join(MOSAIC_FILE);
    mosaic_tiles(&collection.tiles, &output)?;
    Ok(output)
}

/// Merge `tiles` into one GeoTIFF covering their union extent.
///
/// Tiles are painted in the order given, so where they overlap the last one wins.
/// Pixels equal to a tile's nodata value do not paint. The driver, size and geotransform
/// of the output are recomputed; data type, projection and nodata come from the tiles.
pub fn mosaic_tiles(tiles: &[PathBuf], output: &Path) -> Result<()> {
    if tiles.is_empty() {
        return Err(PipelineError::NoTiles(output.display().to_string()).into());
    }

    let datasets = tiles
        .iter()
        .map(|tile| {
            Dataset::open(tile).with_context(|| format!("Failed to open tile {}", tile.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let vrt = build_vrt(None, &datasets, None)?;
    let (width, height) = vrt.raster_size();
    log::info!(
        "Merged {} tiles into {}x{} pixels, transform {:?}",
        datasets.len(),
        width,
        height,
        vrt.geo_transform()?
    );

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mosaic = vrt.create_copy(&driver, output, &[])?;
    log::debug!("Wrote {}", output.display());

    // Flush the copy before the tiles it reads from are closed
    drop(mosaic);
    drop(vrt);
    drop(datasets);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::read_band_f32;
    use crate::raster::testing::*;

    #[test]
    fn test_adjacent_tiles_cover_union() {
        let dir = tempfile::tempdir().unwrap();
        let west = dir.path().join("T44QRD_B04_10m.tiff");
        let east = dir.path().join("T44QRE_B04_10m.tiff");
        write_constant(&west, &grid((500000.0, 1960000.0), (4, 3), 10.0), 1.0);
        write_constant(&east, &grid((500040.0, 1960000.0), (4, 3), 10.0), 2.0);

        let collection = BandCollection {
            band: "B04_10m".to_string(),
            dir: dir.path().to_path_buf(),
            tiles: vec![west, east],
        };
        let output = mosaic(&collection).unwrap();
        assert_eq!(output, dir.path().join(MOSAIC_FILE));

        let (data, grid) = read_band_f32(&output).unwrap();
        assert_eq!(grid.size, (8, 3));
        assert_eq!(data.len(), 4 * 3 + 4 * 3);
        assert_eq!(
            grid.geo_transform,
            Some([500000.0, 10.0, 0.0, 1960000.0, 0.0, -10.0])
        );
        for row in data.chunks(8) {
            assert_eq!(row, &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
        }
    }

    #[test]
    fn test_last_tile_wins_on_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.tiff");
        let second = dir.path().join("b.tiff");
        write_constant(&first, &grid((500000.0, 1960000.0), (4, 2), 10.0), 1.0);
        write_constant(&second, &grid((500020.0, 1960000.0), (4, 2), 10.0), 2.0);

        let output = dir.path().join(MOSAIC_FILE);
        mosaic_tiles(&[first, second], &output).unwrap();

        let (data, grid) = read_band_f32(&output).unwrap();
        assert_eq!(grid.size, (6, 2));
        assert_eq!(&data[..6], &[1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_empty_collection_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let collection = BandCollection {
            band: "B8A_20m".to_string(),
            dir: dir.path().to_path_buf(),
            tiles: vec![],
        };
        let err = mosaic(&collection).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoTiles(band)) if band == "B8A_20m"
        ));
        assert!(!dir.path().join(MOSAIC_FILE).exists());
    }
}
