//! HTTP implementation of the inference gateway

use super::{
    BeamRequest, BeamResponse, Candidate, CandidateRequest, CandidateResponse, GatewayError,
    GeneratedPath, HealthStatus, InferenceGateway, ModelInfo,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Gateway reached over plain HTTP/JSON
pub struct HttpGateway {
    client: Client,
    base_url: String,
    name: String,
}

impl HttpGateway {
    /// Create a gateway for `base_url`. `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, GatewayError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            name: format!("http:{}", base_url),
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Response, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        check_status(response).await
    }

    async fn get(&self, path: &str) -> Result<Response, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");
        let response = self.client.get(&url).send().await?;
        check_status(response).await
    }
}

/// Turn a non-2xx response into `GatewayError::Remote`, preferring the `detail` field
async fn check_status(response: Response) -> Result<Response, GatewayError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Remote {
        status,
        detail: extract_detail(&body),
    })
}

fn extract_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => match value.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        Err(_) => body.to_string(),
    }
}

#[derive(Serialize)]
struct SwitchRequest<'a> {
    filename: &'a str,
}

#[async_trait]
impl InferenceGateway for HttpGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_tokens(&self, request: &CandidateRequest) -> Result<Vec<Candidate>, GatewayError> {
        let response: CandidateResponse = self.post("/next-tokens", request).await?.json().await?;
        Ok(response.candidates)
    }

    async fn beam_search(&self, request: &BeamRequest) -> Result<Vec<GeneratedPath>, GatewayError> {
        let response: BeamResponse = self.post("/beam-search", request).await?.json().await?;
        Ok(response.paths)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        Ok(self.get("/models").await?.json().await?)
    }

    async fn switch_model(&self, filename: &str) -> Result<(), GatewayError> {
        self.post("/models/switch", &SwitchRequest { filename }).await?;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();

        match self.get("/health").await {
            Ok(_) => HealthStatus {
                healthy: true,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => HealthStatus {
                healthy: false,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}
