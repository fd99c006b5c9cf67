#![allow(async_fn_in_trait)]
pub mod aoi;
pub mod bands;
pub mod config;
pub mod copernicus;
pub mod destination;
pub mod download_plan;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod raster;
pub mod source;
