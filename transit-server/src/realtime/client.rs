//! GTFS-Realtime feed provider client.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use super::error::RealtimeError;

/// Default feed URL (National Transport Authority, Ireland).
pub const DEFAULT_FEED_URL: &str = "https://api.nationaltransport.ie/gtfsr/v2/gtfsr?format=json";

/// Source of raw realtime feed documents.
///
/// The cache validates whatever the provider returns, so implementations
/// only deal with transport. This abstraction allows the cache to be tested
/// with canned payloads.
pub trait FeedProvider: Send + Sync {
    /// Fetch the current feed as untyped JSON.
    fn fetch(&self) -> impl Future<Output = Result<serde_json::Value, RealtimeError>> + Send;
}

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Value for the `x-api-key` header
    pub api_key: String,
    /// Feed URL
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl FeedClientConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            url: DEFAULT_FEED_URL.to_string(),
            timeout_secs: 30,
        }
    }

    /// Set a custom feed URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP client for the realtime feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    url: String,
}

impl FeedClient {
    /// Create a new feed client.
    pub fn new(config: FeedClientConfig) -> Result<Self, RealtimeError> {
        let mut headers = HeaderMap::new();

        let api_key = HeaderValue::from_str(&config.api_key).map_err(|_| RealtimeError::Api {
            status: 0,
            message: "Invalid API key format".to_string(),
        })?;
        headers.insert(HeaderName::from_static("x-api-key"), api_key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: config.url,
        })
    }

    /// The URL this client polls.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FeedProvider for FeedClient {
    async fn fetch(&self) -> Result<serde_json::Value, RealtimeError> {
        let response = self.http.get(&self.url).send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "fetched realtime feed");

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RealtimeError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RealtimeError::Api {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| RealtimeError::Format {
            message: format!("body is not JSON: {e}"),
        })
    }
}
