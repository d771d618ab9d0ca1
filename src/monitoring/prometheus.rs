/// Prometheus HTTP API client
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{ActiveTarget, MonitoringApi, RuleGroup, QUERY_TIMEOUT};

/// Response envelope shared by every `/api/v1` endpoint
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RulesData {
    #[serde(default)]
    groups: Vec<RuleGroup>,
}

#[derive(Debug, Deserialize)]
struct TargetsData {
    #[serde(rename = "activeTargets", default)]
    active_targets: Vec<ActiveTarget>,
}

/// Read-only Prometheus API client
#[derive(Clone)]
pub struct PrometheusClient {
    client: Client,
    base: Url,
}

impl PrometheusClient {
    /// Create a client for the Prometheus server at `url`
    pub fn new(url: &str) -> Result<Self> {
        let mut base = Url::parse(url).with_context(|| format!("Invalid Prometheus URL {}", url))?;

        // Keep any path prefix when joining endpoint paths
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Invalid endpoint {}", path))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send GET request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read API response")?;

        parse_response(status, &body)
    }
}

/// Unwrap the `data` of a Prometheus response, turning error envelopes into errors
fn parse_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    match serde_json::from_str::<ApiResponse<T>>(body) {
        Ok(ApiResponse {
            status: envelope,
            data: Some(data),
            ..
        }) if envelope == "success" => Ok(data),
        Ok(ApiResponse {
            error_type, error, ..
        }) => anyhow::bail!(
            "API error: {} - {}",
            error_type.unwrap_or_else(|| "unknown".to_string()),
            error.unwrap_or_else(|| format!("status {}", status))
        ),
        Err(_) if !status.is_success() => {
            anyhow::bail!("API request failed with status {}: {}", status, body)
        }
        Err(e) => Err(e).context("Failed to parse API response"),
    }
}

#[async_trait]
impl MonitoringApi for PrometheusClient {
    async fn rule_groups(&self) -> Result<Vec<RuleGroup>> {
        let data: RulesData = self.get("api/v1/rules").await?;
        Ok(data.groups)
    }

    async fn active_targets(&self) -> Result<Vec<ActiveTarget>> {
        let data: TargetsData = self.get("api/v1/targets?state=active").await?;
        Ok(data.active_targets)
    }
}
