//! Client for the National Weather Service API.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const NWS_API_BASE: &str = "https://api.weather.gov";
pub const USER_AGENT: &str = "weather-app/1.0";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure talking to the upstream weather API.
///
/// These never reach the tool caller; every fetch degrades to `None`.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Clone)]
pub struct NwsClient {
    http: reqwest::Client,
    base_url: String,
}

impl NwsClient {
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_base_url(NWS_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Active alerts for a two-letter state code.
    pub async fn active_alerts(&self, state: &str) -> Option<Value> {
        self.fetch(&format!("{}/alerts/active/area/{state}", self.base_url))
            .await
    }

    /// Grid point metadata for a coordinate, including its forecast URL.
    pub async fn point(&self, latitude: f64, longitude: f64) -> Option<Value> {
        self.fetch(&format!("{}/points/{latitude},{longitude}", self.base_url))
            .await
    }

    /// GET `url` as GeoJSON, absorbing any failure into `None`.
    pub async fn fetch(&self, url: &str) -> Option<Value> {
        match self.get_json(url).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%url, "weather request failed: {e}");
                None
            }
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, UpstreamError> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .header("Accept", "application/geo+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        Ok(response.json().await?)
    }
}
