use crate::bands::BandSpec;
use crate::error::PipelineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use toml;

pub const USERNAME_ENV: &str = "COPERNICUS_USERNAME";
pub const PASSWORD_ENV: &str = "COPERNICUS_PASSWORD";

/// What a stage does when its destination directory already has contents.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExistingOutput {
    #[default]
    Fail,
    Clear,
    Keep,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    /// Environment variables take precedence over values from the config file.
    pub fn resolve(self: &Self) -> Result<Self> {
        let username = env::var(USERNAME_ENV).unwrap_or_else(|_| self.username.clone());
        let password = env::var(PASSWORD_ENV).unwrap_or_else(|_| self.password.clone());
        if username.is_empty() {
            return Err(PipelineError::MissingCredentials("username").into());
        }
        if password.is_empty() {
            return Err(PipelineError::MissingCredentials("password").into());
        }
        Ok(Self { username, password })
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct QueryConfig {
    pub platform: String,
    pub product_type: String,
    pub date_window_days: u32,
    pub cloud_cover_max: f64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    100
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ClipConfig {
    pub nodata: f64,
    #[serde(default = "default_crop")]
    pub crop_to_cutline: bool,
}

fn default_crop() -> bool {
    true
}

/// A red/near-infrared band pair to compute NDVI from.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IndexPair {
    pub red: String,
    pub nir: String,
}

impl IndexPair {
    pub fn file_name(self: &Self) -> String {
        format!("ndvi_{}_{}.tiff", self.red, self.nir)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PipelineConfig {
    pub aoi_path: PathBuf,
    pub output_root: PathBuf,
    #[serde(default)]
    pub existing_output: ExistingOutput,
    #[serde(default)]
    pub credentials: Credentials,
    pub query: QueryConfig,
    pub bands: Vec<BandSpec>,
    pub clip: ClipConfig,
    pub indices: Vec<IndexPair>,
}

/// Defaults for a Sentinel-2 L2A run: red and NIR at 10m and 20m.
pub fn pipeline_toml() -> toml::Table {
    toml::toml! {
        aoi_path = "./shp/aoi.shp"

        output_root = "./outputs"

        existing_output = "fail"

        [credentials]
        username = ""
        password = ""

        [query]
        platform = "SENTINEL-2"
        product_type = "S2MSI2A"
        date_window_days = 9
        cloud_cover_max = 5.0
        page_size = 100

        [[bands]]
        resolution = "R10m"
        band = "B04_10m"

        [[bands]]
        resolution = "R10m"
        band = "B08_10m"

        [[bands]]
        resolution = "R20m"
        band = "B04_20m"

        [[bands]]
        resolution = "R20m"
        band = "B8A_20m"

        [clip]
        nodata = 0.0
        crop_to_cutline = true

        [[indices]]
        red = "B04_10m"
        nir = "B08_10m"

        [[indices]]
        red = "B04_20m"
        nir = "B8A_20m"
    }
}

impl PipelineConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(self: &Self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let config: Self = toml::from_str(&table.to_string())?;
        Ok(config)
    }

    pub fn validate(self: &Self) -> Result<()> {
        if self.bands.is_empty() {
            return Err(invalid("at least one band is required"));
        }
        if self.query.date_window_days == 0 {
            return Err(invalid("date_window_days must be positive"));
        }
        if !(0.0..=100.0).contains(&self.query.cloud_cover_max) {
            return Err(invalid("cloud_cover_max must be within 0..=100"));
        }
        if self.query.page_size == 0 {
            return Err(invalid("page_size must be positive"));
        }
        for pair in self.indices.iter() {
            for band in [&pair.red, &pair.nir] {
                if self.band(band).is_none() {
                    return Err(invalid(&format!(
                        "index band {} is not listed under [[bands]]",
                        band
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn band(self: &Self, name: &str) -> Option<&BandSpec> {
        self.bands.iter().find(|b| b.band == name)
    }

    pub fn geojson_path(self: &Self) -> PathBuf {
        let stem = self
            .aoi_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "aoi".to_string());
        self.output_root
            .join("geojson")
            .join(format!("{}.geojson", stem))
    }

    pub fn imagery_dir(self: &Self) -> PathBuf {
        self.output_root.join("sentinel_imagery")
    }

    pub fn bands_dir(self: &Self) -> PathBuf {
        self.output_root.join("bands")
    }

    pub fn ndvi_dir(self: &Self) -> PathBuf {
        self.output_root.join("ndvi")
    }
}

fn invalid(reason: &str) -> anyhow::Error {
    PipelineError::InvalidConfig(reason.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> PipelineConfig {
        PipelineConfig::from_template(&pipeline_toml()).unwrap()
    }

    #[test]
    fn test_template() {
        let config = template();
        assert_eq!(config.bands.len(), 4);
        assert_eq!(config.indices.len(), 2);
        assert_eq!(config.query.product_type, "S2MSI2A");
        assert_eq!(config.existing_output, ExistingOutput::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_write_then_read_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inputs").join("pipeline.toml");
        template().write(&path).unwrap();

        let config = PipelineConfig::read(&path).unwrap();
        assert_eq!(config.query.date_window_days, 9);
        assert_eq!(config.bands[3].band, "B8A_20m");
    }

    #[test]
    fn test_index_must_reference_configured_band() {
        let mut config = template();
        config.indices.push(IndexPair {
            red: "B04_60m".to_string(),
            nir: "B08_10m".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cloud_cover_range() {
        let mut config = template();
        config.query.cloud_cover_max = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_paths() {
        let mut config = template();
        config.aoi_path = PathBuf::from("./shp/Visakhapatnam_Simplified.shp");
        config.output_root = PathBuf::from("/data/run");
        assert_eq!(
            config.geojson_path(),
            PathBuf::from("/data/run/geojson/Visakhapatnam_Simplified.geojson")
        );
        assert_eq!(config.imagery_dir(), PathBuf::from("/data/run/sentinel_imagery"));
        assert_eq!(
            config.indices[0].file_name(),
            "ndvi_B04_10m_B08_10m.tiff".to_string()
        );
    }

    #[test]
    fn test_existing_output_parses_lowercase() {
        let mut table = pipeline_toml();
        table.insert("existing_output".to_string(), "clear".into());
        let config = PipelineConfig::from_template(&table).unwrap();
        assert_eq!(config.existing_output, ExistingOutput::Clear);
    }

    // Only test that sets the credential variables
    #[test]
    fn test_credentials_resolve() {
        env::set_var(USERNAME_ENV, "env-user");
        env::remove_var(PASSWORD_ENV);

        let from_file = Credentials {
            username: "file-user".to_string(),
            password: "file-secret".to_string(),
        };
        let resolved = from_file.resolve().unwrap();
        assert_eq!(resolved.username, "env-user");
        assert_eq!(resolved.password, "file-secret");

        let err = Credentials::default().resolve().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingCredentials("password"))
        ));

        env::set_var(PASSWORD_ENV, "env-secret");
        assert_eq!(from_file.resolve().unwrap().password, "env-secret");

        env::remove_var(USERNAME_ENV);
        env::remove_var(PASSWORD_ENV);
    }
}
