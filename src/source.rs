//! The seams between the pipeline and whatever serves catalog pages and product archives.
use crate::copernicus::query::ProductPage;
use anyhow::Result;
use bytes::Bytes;
use futures_util::stream::BoxStream;

pub struct ProductStream {
    /// True when the body continues from the requested start byte rather than from zero.
    pub resumed: bool,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes>>,
}

pub trait ProductSource {
    /// Open the archive for `product_id`, asking for bytes from `start_byte` onwards.
    async fn get_product(self: &Self, product_id: &str, start_byte: u64) -> Result<ProductStream>;
}

pub trait CatalogSource {
    /// Fetch one page of search results.
    async fn get_page(self: &Self, url: &str) -> Result<ProductPage>;
}
