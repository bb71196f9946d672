//! Remote inference gateway abstraction
//!
//! The model, its tokenizer and its sampler live behind HTTP endpoints. This
//! module defines the request/response shapes the controller exchanges with
//! them and the trait the controller calls through.

mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to the inference gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Gateway returned HTTP {status}: {detail}")]
    Remote { status: u16, detail: String },

    #[error("Gateway returned no paths")]
    EmptyResponse,
}

/// Sampling parameters sent with every candidate fetch
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
}

fn default_temperature() -> f32 { 0.8 }
fn default_top_k() -> u32 { 40 }
fn default_top_p() -> f32 { 0.95 }
fn default_repeat_penalty() -> f32 { 1.1 }

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
        }
    }
}

impl SamplingConfig {
    /// Clamp every field into its valid range
    pub fn clamped(self) -> Self {
        Self {
            temperature: self.temperature.max(0.0),
            top_k: self.top_k,
            top_p: self.top_p.clamp(0.0, 1.0),
            repeat_penalty: self.repeat_penalty.max(0.0),
        }
    }
}

/// Candidate fetch request body
#[derive(Debug, Clone, Serialize)]
pub struct CandidateRequest {
    pub text: String,
    pub temp: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
}

impl CandidateRequest {
    pub fn new(text: impl Into<String>, config: &SamplingConfig) -> Self {
        Self {
            text: text.into(),
            temp: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            repeat_penalty: config.repeat_penalty,
        }
    }
}

/// One ranked next-token candidate
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Candidate {
    pub token: String,
    /// Display probability, 0-100
    #[serde(rename = "prob")]
    pub probability_pct: f64,
    /// Filtered out by top-k/top-p: shown, never auto-selected
    #[serde(default)]
    pub excluded: bool,
}

impl Candidate {
    pub fn new(token: impl Into<String>, probability_pct: f64) -> Self {
        Self {
            token: token.into(),
            probability_pct,
            excluded: false,
        }
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidateResponse {
    pub candidates: Vec<Candidate>,
}

/// Beam fetch request body
#[derive(Debug, Clone, Serialize)]
pub struct BeamRequest {
    pub context: String,
    pub num_paths: u32,
    pub depth: u32,
}

/// A token on a speculative path, probability in 0-1
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PathToken {
    pub token: String,
    #[serde(rename = "prob")]
    pub probability: f64,
}

/// A speculative continuation as returned by the gateway
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedPath {
    pub id: String,
    /// Full context plus continuation
    pub text: String,
    #[serde(rename = "cumulative_prob")]
    pub cumulative_probability: f64,
    #[serde(default)]
    pub tokens: Vec<PathToken>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BeamResponse {
    pub paths: Vec<GeneratedPath>,
}

/// A model file known to the gateway
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    pub filename: String,
    #[serde(default)]
    pub size_mb: f64,
    #[serde(default)]
    pub path: Option<String>,
}

/// Health status of the gateway
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Trait for the remote inference service
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Gateway name for logging/identification
    fn name(&self) -> &str;

    /// Ranked next-token candidates for `text`
    async fn next_tokens(&self, request: &CandidateRequest) -> Result<Vec<Candidate>, GatewayError>;

    /// Independent speculative continuations of `request.context`
    async fn beam_search(&self, request: &BeamRequest) -> Result<Vec<GeneratedPath>, GatewayError>;

    /// Model files available to the gateway
    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError>;

    /// Load a different model file
    async fn switch_model(&self, filename: &str) -> Result<(), GatewayError>;

    async fn health_check(&self) -> HealthStatus;
}
