use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use plate_core::error::EngineError;
use plate_core::estimate::EstimationProvider;

use crate::config::EstimatorConfig;

#[derive(Serialize)]
struct EstimateRequest<'a> {
    text: &'a str,
}

/// Posts `{"text": ...}` to the configured endpoint and hands the raw reply
/// back for extraction.
pub struct HttpEstimator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEstimator {
    pub fn from_config(config: &EstimatorConfig) -> Result<Self> {
        let endpoint = config.endpoint.clone().context(
            "No estimator endpoint configured. Set [estimator] endpoint in config.toml or PLATE_ESTIMATOR_URL",
        )?;
        let client = reqwest::Client::builder()
            .user_agent(format!("plate-cli/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key(),
        })
    }
}

#[async_trait]
impl EstimationProvider for HttpEstimator {
    async fn estimate(&self, text: &str) -> plate_core::Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&EstimateRequest { text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let upstream = |e: reqwest::Error| EngineError::UpstreamEstimation(e.to_string());
        request
            .send()
            .await
            .map_err(upstream)?
            .error_for_status()
            .map_err(upstream)?
            .text()
            .await
            .map_err(upstream)
    }
}
