//! HTTP client for catalog pages.

use super::error::ScrapeError;
use crate::config::{HttpConfig, RetryPolicy};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

/// Fetches the HTML of one page.
///
/// The pipeline only talks to the catalog through this trait.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, ScrapeError>;
}

/// Client for fetching pages from the course catalog.
pub struct CatalogClient {
    client: Client,
    retries: u32,
    retry_policy: RetryPolicy,
}

impl CatalogClient {
    /// Creates a new client from the HTTP and retry configuration.
    pub fn new(http: &HttpConfig, retry_policy: RetryPolicy) -> Result<Self, ScrapeError> {
        // The catalog is an ASP.NET site that keeps state in session cookies
        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::limited(10))
            .user_agent(&http.user_agent)
            .connect_timeout(http.connect_timeout())
            .timeout(http.fetch_timeout())
            .build()
            .map_err(|e| ScrapeError::Client {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            retries: http.fetch_retries,
            retry_policy,
        })
    }

    /// Performs a single GET, without retries.
    async fn get_once(&self, url: &Url) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ScrapeError::from_reqwest(url.as_str(), e))?;

        if !response.status().is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ScrapeError::from_reqwest(url.as_str(), e))?;

        debug!(url = %url, html_len = html.len(), "Fetched page");
        Ok(html)
    }
}

#[async_trait]
impl PageFetcher for CatalogClient {
    async fn fetch(&self, url: &Url) -> Result<String, ScrapeError> {
        info!(url = %url, "Fetching page");
        self.retry_policy
            .run(url.as_str(), self.retries, || self.get_once(url))
            .await
    }
}
