//! The five stages in order. Each stage hands the next one the paths it produced.
use crate::aoi::{self, Aoi};
use crate::bands::{collect_band, BandCollection};
use crate::config::PipelineConfig;
use crate::copernicus::{search, CatalogQuery, Provider};
use crate::destination::prepare_destination;
use crate::download_plan::generate_download_plan;
use crate::error::PipelineError;
use crate::extract::{extract_archives, extract_selected, Extraction};
use crate::raster::clip::{clip, ClipOptions, CLIPPED_FILE};
use crate::raster::mosaic::mosaic;
use crate::raster::ndvi::generate_ndvi;
use crate::source::{CatalogSource, ProductSource};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DOWNLOAD_PLAN_FILE: &str = "download_plan.json";

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Start from archives already present in the imagery directory.
    pub skip_download: bool,
}

#[derive(Debug, Clone)]
pub struct BandOutput {
    pub collection: BandCollection,
    pub mosaic: PathBuf,
}

#[derive(Debug)]
pub struct PipelineReport {
    pub aoi: Aoi,
    pub downloads: Vec<PathBuf>,
    pub extraction: Extraction,
    pub bands: Vec<BandOutput>,
    /// Clipped raster per band name.
    pub clipped: BTreeMap<String, PathBuf>,
    pub indices: Vec<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn prepare_aoi(self: &Self) -> Result<Aoi> {
        aoi::prepare(&self.config)
    }

    /// Query the catalog for the AOI and download every match.
    pub async fn acquire(self: &Self, aoi: &Aoi) -> Result<Vec<PathBuf>> {
        let credentials = self.config.credentials.resolve()?;
        let provider = Provider::new(credentials)?;
        provider.authenticate().await?;
        self.acquire_from(&provider, aoi).await
    }

    /// Search `source` for the AOI, then download the results into the imagery directory.
    pub async fn acquire_from<S>(self: &Self, source: &S, aoi: &Aoi) -> Result<Vec<PathBuf>>
    where
        S: CatalogSource + ProductSource,
    {
        let query = CatalogQuery::trailing_window(&aoi.wkt, &self.config.query, Utc::now())?;
        log::info!(
            "Searching {} {} from {} to {} with cloud cover <= {}%",
            query.collection,
            query.product_type,
            query.start,
            query.end,
            query.cloud_cover_max
        );
        let catalog = search(source, &query).await?;
        if catalog.is_empty() {
            return Err(PipelineError::NoProducts.into());
        }
        for product in catalog.iter() {
            log::info!(
                "{} acquired {} cloud cover {}",
                product.name,
                product.acquired,
                product
                    .cloud_cover
                    .map(|c| format!("{:.2}%", c))
                    .unwrap_or_else(|| "unknown".to_string())
            );
        }

        let imagery_dir = self.config.imagery_dir();
        prepare_destination(&imagery_dir, self.config.existing_output)?;
        let plan = generate_download_plan(&catalog, &imagery_dir);
        plan.write(imagery_dir.join(DOWNLOAD_PLAN_FILE))?;

        plan.execute(source).await
    }

    /// Extract `archives`, or every archive in the imagery directory when none are given.
    pub fn extract(self: &Self, archives: &[PathBuf]) -> Result<Extraction> {
        let imagery_dir = self.config.imagery_dir();
        if archives.is_empty() {
            extract_archives(&imagery_dir)
        } else {
            extract_selected(&imagery_dir, archives)
        }
    }

    /// Collect and mosaic every configured band from the extracted scenes.
    pub fn mosaic_bands(self: &Self, extraction: &Extraction) -> Result<Vec<BandOutput>> {
        let bands_dir = self.config.bands_dir();
        let mut outputs = vec![];
        for spec in self.config.bands.iter() {
            let collection = collect_band(
                spec,
                &extraction.scenes,
                &bands_dir,
                self.config.existing_output,
            )?;
            let mosaic = mosaic(&collection)?;
            outputs.push(BandOutput { collection, mosaic });
        }
        Ok(outputs)
    }

    pub fn clip_bands(
        self: &Self,
        aoi: &Aoi,
        bands: &[BandOutput],
    ) -> Result<BTreeMap<String, PathBuf>> {
        let options = ClipOptions {
            cutline: aoi.shapefile.clone(),
            nodata: self.config.clip.nodata,
            crop_to_cutline: self.config.clip.crop_to_cutline,
        };
        let mut clipped = BTreeMap::new();
        for band in bands {
            let dst = band.collection.dir.join(CLIPPED_FILE);
            let path = clip(&band.mosaic, &dst, &options)?;
            clipped.insert(band.collection.band.clone(), path);
        }
        Ok(clipped)
    }

    pub fn generate_indices(
        self: &Self,
        clipped: &BTreeMap<String, PathBuf>,
    ) -> Result<Vec<PathBuf>> {
        let ndvi_dir = self.config.ndvi_dir();
        prepare_destination(&ndvi_dir, self.config.existing_output)?;

        let mut outputs = vec![];
        for pair in self.config.indices.iter() {
            let red = clipped
                .get(&pair.red)
                .ok_or(anyhow!("No clipped raster for red band {}", pair.red))?;
            let nir = clipped
                .get(&pair.nir)
                .ok_or(anyhow!("No clipped raster for nir band {}", pair.nir))?;
            outputs.push(generate_ndvi(red, nir, &ndvi_dir.join(pair.file_name()))?);
        }
        Ok(outputs)
    }

    pub async fn run(self: &Self, options: &RunOptions) -> Result<PipelineReport> {
        let aoi = self.prepare_aoi()?;

        let downloads = if options.skip_download {
            log::info!(
                "Skipping download, using archives in {}",
                self.config.imagery_dir().display()
            );
            vec![]
        } else {
            self.acquire(&aoi).await?
        };

        let extraction = self.extract(&downloads)?;
        let bands = self.mosaic_bands(&extraction)?;
        let clipped = self.clip_bands(&aoi, &bands)?;
        let indices = self.generate_indices(&clipped)?;

        Ok(PipelineReport {
            aoi,
            downloads,
            extraction,
            bands,
            clipped,
            indices,
        })
    }
}
