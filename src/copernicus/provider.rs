use super::query::ProductPage;
use crate::config::Credentials;
use crate::error::PipelineError;
use crate::source::{CatalogSource, ProductSource, ProductStream};
use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use reqwest::{header, redirect, Client, Response, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

pub const IDENTITY_API: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
pub const DOWNLOAD_API: &str = "https://zipper.dataspace.copernicus.eu/odata/v1/Products";

const CLIENT_ID: &str = "cdse-public";
const MAX_REDIRECTS: usize = 10;
// Refresh this long before the identity service says the token expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct Provider {
    client: Client,
    credentials: Credentials,
    token: Mutex<Option<AccessToken>>,
}

impl Provider {
    pub fn new(credentials: Credentials) -> Result<Self> {
        // Redirects are followed by hand so the bearer token is not dropped between hosts
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Obtain a fresh access token with the configured username and password.
    pub async fn authenticate(self: &Self) -> Result<()> {
        let response = self
            .client
            .post(IDENTITY_API)
            .form(&[
                ("grant_type", "password"),
                ("client_id", CLIENT_ID),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;
        let token: TokenResponse = response.json().await?;

        log::info!(
            "Authenticated as {} (token valid for {}s)",
            self.credentials.username,
            token.expires_in
        );
        let mut guard = self.token.lock().await;
        *guard = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(())
    }

    async fn access_token(self: &Self) -> Result<String> {
        {
            let guard = self.token.lock().await;
            if let Some(token) = guard.as_ref() {
                if token.expires_at > Instant::now() + EXPIRY_MARGIN {
                    return Ok(token.value.clone());
                }
            }
        }
        self.authenticate().await?;
        let guard = self.token.lock().await;
        guard
            .as_ref()
            .map(|t| t.value.clone())
            .ok_or(anyhow!("No access token after authentication"))
    }

    async fn get_following_redirects(self: &Self, url: &str, start_byte: u64) -> Result<Response> {
        let token = self.access_token().await?;
        let mut url = Url::parse(url)?;

        for _ in 0..MAX_REDIRECTS {
            let mut request = self.client.get(url.clone()).bearer_auth(&token);
            if start_byte > 0 {
                request = request.header(header::RANGE, format!("bytes={}-", start_byte));
            }
            let response = request.send().await?;

            if response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(anyhow!("Redirect from {} without a location", url))?;
                url = url.join(location)?;
                log::debug!("Following redirect to {}", url);
                continue;
            }
            return check_status(response).await;
        }
        Err(anyhow!("Too many redirects while downloading {}", url))
    }
}

impl CatalogSource for Provider {
    async fn get_page(self: &Self, url: &str) -> Result<ProductPage> {
        let response = check_status(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }
}

impl ProductSource for Provider {
    async fn get_product(self: &Self, product_id: &str, start_byte: u64) -> Result<ProductStream> {
        let url = download_url(product_id);
        let response = self.get_following_redirects(&url, start_byte).await?;

        let resumed = response.status() == StatusCode::PARTIAL_CONTENT;
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from))
            .boxed();

        Ok(ProductStream {
            resumed,
            content_length,
            body,
        })
    }
}

pub fn download_url(product_id: &str) -> String {
    format!("{}({})/$value", DOWNLOAD_API, product_id)
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::Http {
        status: status.as_u16(),
        url,
        body,
    }
    .into())
}
