//! Earth Engine REST client.

use async_trait::async_trait;
use gcloud_client::ApiClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{ComputeError, ComputeResult};
use crate::expression::Expression;
use crate::zonal::{parse_features, ZonalFeature, ZonalRequest};
use crate::ComputeService;

pub const DEFAULT_ENDPOINT: &str = "https://earthengine.googleapis.com";

#[derive(Debug, Clone)]
pub struct EarthEngineConfig {
    /// API root, overridable for testing
    pub endpoint: String,
    /// Cloud project billed for compute
    pub project: String,
}

impl EarthEngineConfig {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project: project.into(),
        }
    }
}

#[derive(Serialize)]
struct ComputeValueRequest<'a> {
    expression: &'a Expression,
}

#[derive(Deserialize)]
struct ComputeValueResponse {
    result: Option<serde_json::Value>,
}

pub struct EarthEngineClient {
    api: ApiClient,
    config: EarthEngineConfig,
}

impl EarthEngineClient {
    pub fn new(api: ApiClient, config: EarthEngineConfig) -> Self {
        Self { api, config }
    }

    /// Evaluate an expression and return its result value.
    #[instrument(skip(self, expression), fields(project = %self.config.project, nodes = expression.values.len()))]
    pub async fn compute_value(&self, expression: &Expression) -> ComputeResult<serde_json::Value> {
        let url = format!(
            "{}/v1/projects/{}/value:compute",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project
        );
        let body = ComputeValueRequest { expression };

        let response: ComputeValueResponse = self
            .api
            .send_json("earthengine value:compute", |http| http.post(&url).json(&body))
            .await?;

        response
            .result
            .ok_or_else(|| ComputeError::MalformedResult("response has no result".to_string()))
    }
}

#[async_trait]
impl ComputeService for EarthEngineClient {
    async fn zonal_statistics(&self, request: &ZonalRequest) -> ComputeResult<Vec<ZonalFeature>> {
        let expression = request.to_expression()?;
        debug!(
            statistic = %request.statistic,
            features = request.features.len(),
            extent = ?request.extent().map(|b| b.to_string()),
            "Computing zonal statistics"
        );

        let result = self.compute_value(&expression).await?;
        parse_features(&result)
    }
}
