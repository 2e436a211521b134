//! HTTP implementation of the binary fetch primitive.

use std::time::Duration;

use reqwest::Url;
use tracing::trace;

use crate::domain::ports::{CacheError, CacheResult, FetchedResource, ResourceFetcherPort};

/// Fetches resources over HTTP, resolving relative locators against a base URL.
#[derive(Debug, Clone)]
pub struct HttpResourceFetcher {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpResourceFetcher {
    /// Creates a fetcher.
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: Option<&str>, timeout: Duration) -> CacheResult<Self> {
        let base_url = base_url
            .map(Url::parse)
            .transpose()
            .map_err(|e| CacheError::Config(format!("Invalid base URL: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::NetworkError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Resolves a locator to an absolute URL.
    ///
    /// # Errors
    /// Returns error if the locator is relative and no base URL is configured.
    pub fn resolve(&self, locator: &str) -> CacheResult<Url> {
        // Joining an absolute locator onto the base yields the locator itself.
        let resolved = match &self.base_url {
            Some(base) => base.join(locator),
            None => Url::parse(locator),
        };
        resolved.map_err(|e| CacheError::Config(format!("Invalid locator {locator}: {e}")))
    }
}

#[async_trait::async_trait]
impl ResourceFetcherPort for HttpResourceFetcher {
    async fn fetch(&self, locator: &str) -> CacheResult<FetchedResource> {
        let url = self.resolve(locator)?;
        trace!(url = %url, "Fetching resource");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::NetworkError(format!("Request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CacheError::NotFound(locator.to_string()));
        }
        if !status.is_success() {
            return Err(CacheError::NetworkError(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CacheError::NetworkError(format!("Failed to read body: {e}")))?;

        Ok(FetchedResource {
            bytes,
            content_type,
        })
    }
}
