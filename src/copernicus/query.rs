use crate::config::QueryConfig;
use crate::error::PipelineError;
use crate::source::CatalogSource;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

pub const CATALOG_API: &str = "https://catalogue.dataspace.copernicus.eu/odata/v1/Products";

/// A single spatial + attribute search against the catalog.
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub wkt: String,
    pub collection: String,
    pub product_type: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub cloud_cover_max: f64,
    pub page_size: u32,
}

impl CatalogQuery {
    /// Search `date_window_days` before `now` through `now`.
    pub fn trailing_window(wkt: &str, config: &QueryConfig, now: DateTime<Utc>) -> Result<Self> {
        let start = now
            .checked_sub_signed(Duration::days(config.date_window_days as i64))
            .ok_or(PipelineError::InvalidConfig(format!(
                "date_window_days {} reaches before the earliest representable date",
                config.date_window_days
            )))?;
        Ok(Self {
            wkt: wkt.to_string(),
            collection: config.platform.to_uppercase(),
            product_type: config.product_type.clone(),
            start,
            end: now,
            cloud_cover_max: config.cloud_cover_max,
            page_size: config.page_size,
        })
    }

    pub fn filter(self: &Self) -> String {
        let clauses = [
            format!("Collection/Name eq '{}'", self.collection),
            format!(
                "OData.CSC.Intersects(area=geography'SRID=4326;{}')",
                self.wkt
            ),
            format!("ContentDate/Start ge {}", odata_timestamp(&self.start)),
            format!("ContentDate/Start le {}", odata_timestamp(&self.end)),
            format!(
                "Attributes/OData.CSC.StringAttribute/any(att:att/Name eq 'productType' \
                 and att/OData.CSC.StringAttribute/Value eq '{}')",
                self.product_type
            ),
            format!(
                "Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' \
                 and att/OData.CSC.DoubleAttribute/Value le {:.2})",
                self.cloud_cover_max
            ),
        ];
        clauses.join(" and ")
    }

    pub fn url(self: &Self) -> Result<Url> {
        let url = Url::parse_with_params(
            CATALOG_API,
            &[
                ("$filter", self.filter()),
                ("$orderby", "ContentDate/Start desc".to_string()),
                ("$expand", "Attributes".to_string()),
                ("$top", self.page_size.to_string()),
            ],
        )?;
        Ok(url)
    }
}

/// Run `query` and collect every page of results, following `@odata.nextLink`.
pub async fn search(source: &impl CatalogSource, query: &CatalogQuery) -> Result<ProductCatalog> {
    let mut catalog = ProductCatalog::default();
    let mut next = Some(query.url()?.to_string());

    while let Some(url) = next {
        log::debug!("Querying {}", url);
        let page = source.get_page(&url).await?;
        next = page.next_link.clone();
        catalog.extend_from_page(page);
    }

    log::info!("Catalog query matched {} products", catalog.len());
    Ok(catalog)
}

fn odata_timestamp(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// One page of the catalog's product listing.
#[derive(Deserialize, Debug)]
pub struct ProductPage {
    #[serde(default)]
    pub value: Vec<CatalogProduct>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogProduct {
    pub id: String,
    pub name: String,
    pub content_length: Option<u64>,
    pub content_date: ContentDate,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct ContentDate {
    pub start: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct Attribute {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ProductMetadata {
    pub id: String,
    pub name: String,
    pub acquired: DateTime<Utc>,
    pub cloud_cover: Option<f64>,
    pub platform: Option<String>,
    pub product_type: Option<String>,
    pub size: Option<u64>,
}

impl From<CatalogProduct> for ProductMetadata {
    fn from(product: CatalogProduct) -> Self {
        let attribute = |name: &str| {
            product
                .attributes
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.clone())
        };
        let cloud_cover = attribute("cloudCover").and_then(|v| v.as_f64());
        let platform = attribute("platformShortName").and_then(|v| v.as_str().map(String::from));
        let product_type = attribute("productType").and_then(|v| v.as_str().map(String::from));

        Self {
            id: product.id,
            name: product.name,
            acquired: product.content_date.start,
            cloud_cover,
            platform,
            product_type,
            size: product.content_length,
        }
    }
}

/// Products returned by a query, keyed by product id.
#[derive(Debug, Default, Clone)]
pub struct ProductCatalog {
    products: BTreeMap<String, ProductMetadata>,
}

impl ProductCatalog {
    pub fn insert(self: &mut Self, product: ProductMetadata) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn extend_from_page(self: &mut Self, page: ProductPage) {
        for product in page.value {
            self.insert(product.into());
        }
    }

    pub fn get(self: &Self, id: &str) -> Option<&ProductMetadata> {
        self.products.get(id)
    }

    pub fn iter(self: &Self) -> impl Iterator<Item = &ProductMetadata> {
        self.products.values()
    }

    pub fn len(self: &Self) -> usize {
        self.products.len()
    }

    pub fn is_empty(self: &Self) -> bool {
        self.products.is_empty()
    }
}
