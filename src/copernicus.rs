//! Copernicus Data Space Ecosystem: catalog search and product downloads.
mod provider;
pub mod query;

pub use provider::{download_url, Provider};
pub use query::{search, CatalogQuery, ProductCatalog, ProductMetadata};
