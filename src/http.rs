//! HTTP client for the USGS Elevation Point Query Service.
//!
//! The pipeline is sequential, so the async request is driven to completion on
//! a private current-thread runtime. Rate limiting and retries are handled by
//! the sampler; this client makes exactly one request per call.

use std::time::Duration;

use log::debug;
use reqwest::Client;
use tokio::runtime::{Builder, Runtime};

use crate::elevation::oracle::{parse_epqs_value, ElevationOracle};
use crate::{ElevationConfig, Result, TrailError};

/// Public EPQS endpoint.
pub const EPQS_URL: &str = "https://epqs.nationalmap.gov/v1/json";

/// Blocking EPQS oracle.
pub struct EpqsOracle {
    client: Client,
    runtime: Runtime,
    base_url: String,
}

impl EpqsOracle {
    /// Create a client for the public endpoint.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(EPQS_URL, timeout)
    }

    /// Create a client using the configured request timeout.
    pub fn from_config(config: &ElevationConfig) -> Result<Self> {
        Self::new(config.request_timeout)
    }

    /// Create a client for a different endpoint (mirrors, local stubs).
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrailError::config(format!("Failed to create HTTP client: {}", e)))?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TrailError::config(format!("Failed to create runtime: {}", e)))?;

        Ok(Self {
            client,
            runtime,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn query_url(&self, latitude: f64, longitude: f64) -> String {
        format!(
            "{}?x={}&y={}&units=Meters&includeDate=false",
            self.base_url, longitude, latitude
        )
    }

    async fn fetch(&self, url: &str) -> Result<f64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TrailError::transport(e.to_string(), e.status().map(|s| s.as_u16())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrailError::transport(
                format!("HTTP {}", status),
                Some(status.as_u16()),
            ));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            TrailError::transport(format!("invalid JSON: {}", e), Some(status.as_u16()))
        })?;
        parse_epqs_value(&body)
    }
}

impl ElevationOracle for EpqsOracle {
    fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<f64> {
        let url = self.query_url(latitude, longitude);
        debug!("[EpqsOracle] GET {}", url);
        self.runtime.block_on(self.fetch(&url))
    }
}
