//! API client for the cost agent's operator API

use agent_lib::{
    workflow::{BreachKey, Overrides, WorkflowExecution},
    HealthResponse, RightSizingRecommendation,
};
use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// API client for the cost agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    async fn send_get(&self, path: &str) -> Result<Response> {
        let url = self.base_url.join(path).context("Invalid path")?;
        self.client
            .get(url)
            .send()
            .await
            .context("Failed to send request")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = ensure_success(self.send_get(path).await?).await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request for a plain-text body
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let response = ensure_success(self.send_get(path).await?).await?;
        response.text().await.context("Failed to read response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        let response = ensure_success(response).await?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn list_executions(&self) -> Result<Vec<WorkflowExecution>> {
        self.get("api/v1/executions").await
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<WorkflowExecution> {
        self.get(&format!("api/v1/executions/{}", id)).await
    }

    pub async fn execution_report(&self, id: Uuid) -> Result<String> {
        self.get_text(&format!("api/v1/executions/{}/report", id))
            .await
    }

    pub async fn cancel_execution(&self, id: Uuid) -> Result<CancelResponse> {
        self.post(&format!("api/v1/executions/{}/cancel", id), &serde_json::json!({}))
            .await
    }

    pub async fn abort_signal(&self, signal_id: Uuid) -> Result<AbortResponse> {
        self.post("api/v1/overrides/abort", &SignalRequest { signal_id })
            .await
    }

    pub async fn approve_signal(&self, signal_id: Uuid) -> Result<ApproveResponse> {
        self.post("api/v1/overrides/approve", &SignalRequest { signal_id })
            .await
    }

    pub async fn overrides(&self) -> Result<Overrides> {
        self.get("api/v1/overrides").await
    }

    pub async fn recommendations(&self) -> Result<Vec<RightSizingRecommendation>> {
        self.get("api/v1/recommendations").await
    }

    /// Agent health; an unhealthy agent still answers with a body
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.send_get("healthz").await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return response.json().await.context("Failed to parse response");
        }
        let response = ensure_success(response).await?;
        response.json().await.context("Failed to parse response")
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    anyhow::bail!("API error ({}): {}", status, message)
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRequest {
    pub signal_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortResponse {
    pub signal_id: Uuid,
    pub cancelled_executions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub signal_id: Uuid,
    #[serde(default)]
    pub breach: Option<BreachKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub execution_id: Uuid,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
