use crate::config::NationalRailConfig;
use crate::model::{ServiceDetails, ServiceDetailsResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

#[async_trait]
pub trait ServiceLookup: Send + Sync {
    async fn get_service_details(&self, service_id: &str) -> Result<ServiceDetails>;
}

/// Client for the Darwin LDBWS `GetServiceDetails` endpoint.
pub struct NationalRailService {
    client: Client,
    config: NationalRailConfig,
}

impl NationalRailService {
    pub fn new(config: NationalRailConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(NationalRailService { client, config })
    }

    fn details_url(&self, service_id: &str) -> String {
        format!(
            "{}/GetServiceDetails/{}",
            self.config.api_url.trim_end_matches('/'),
            service_id
        )
    }
}

#[async_trait]
impl ServiceLookup for NationalRailService {
    async fn get_service_details(&self, service_id: &str) -> Result<ServiceDetails> {
        let response = self
            .client
            .get(self.details_url(service_id))
            .header("x-apikey", &self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            return Err(anyhow::anyhow!("HTTP error {}: {}", status, body));
        }

        let details: ServiceDetailsResponse = response
            .json()
            .await
            .with_context(|| format!("Unexpected service details body for {}", service_id))?;
        Ok(details.into())
    }
}
