use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Catalog query returned no products")]
    NoProducts,

    #[error("No zip archives found in {0}")]
    NoArchives(PathBuf),

    #[error("No tiles collected for band {0}")]
    NoTiles(String),

    #[error("Destination is not empty: {0} (set existing_output to 'clear' or 'keep')")]
    DestinationNotEmpty(PathBuf),

    #[error("Raster grids differ: red is {red:?}, nir is {nir:?}")]
    GridMismatch {
        red: (usize, usize),
        nir: (usize, usize),
    },

    #[error("Missing catalog credential: {0}")]
    MissingCredentials(&'static str),

    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Area of interest has no geometry: {0}")]
    EmptyAoi(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
