//! Token Explorer - interactive next-token exploration for HTTP-served models
//!
//! This crate provides:
//! - An inference gateway client for candidate and beam endpoints
//! - Epoch tracking and debouncing so stale responses never reach the view
//! - A weighted-sampling auto-play engine serialized against manual picks
//! - Beam exploration with extend/adopt lifecycles
//! - Chat turn <-> flat context reconciliation with end-marker detection
//! - Console input parsing for the `explorer` binary

pub mod autoplay;
pub mod beam;
pub mod candidates;
pub mod chat;
pub mod console;
pub mod controller;
pub mod debounce;
pub mod display;
pub mod epoch;
pub mod gateway;
pub mod sampling;

pub use controller::{Command, Controller, ControllerHandle, ViewEvent};
pub use gateway::{Candidate, HttpGateway, InferenceGateway, SamplingConfig};

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for the explorer
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    /// Context shown (and fetched for) at startup
    #[serde(default = "default_initial_context")]
    pub initial_context: String,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub autoplay: AutoPlayConfig,

    #[serde(default)]
    pub beam: BeamConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

fn default_initial_context() -> String { "Once upon a time, there was a".to_string() }

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            initial_context: default_initial_context(),
            gateway: GatewayConfig::default(),
            sampling: SamplingConfig::default(),
            timing: TimingConfig::default(),
            autoplay: AutoPlayConfig::default(),
            beam: BeamConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl ExplorerConfig {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }
}

/// Where the inference gateway lives
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Transport timeout. Unset means requests may hang indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_base_url() -> String { "http://localhost:8000".to_string() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: None,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Debounce delays and auto-play pacing, in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_context_debounce_ms")]
    pub context_debounce_ms: u64,

    #[serde(default = "default_sampling_debounce_ms")]
    pub sampling_debounce_ms: u64,

    #[serde(default = "default_beam_debounce_ms")]
    pub beam_debounce_ms: u64,

    /// Period between auto-play ticks (200ms = 5 Hz)
    #[serde(default = "default_autoplay_interval_ms")]
    pub autoplay_interval_ms: u64,

    /// How long a pick stays highlighted before it is committed
    #[serde(default = "default_selection_feedback_ms")]
    pub selection_feedback_ms: u64,
}

fn default_context_debounce_ms() -> u64 { 500 }
fn default_sampling_debounce_ms() -> u64 { 500 }
fn default_beam_debounce_ms() -> u64 { 300 }
fn default_autoplay_interval_ms() -> u64 { 200 }
fn default_selection_feedback_ms() -> u64 { 150 }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            context_debounce_ms: default_context_debounce_ms(),
            sampling_debounce_ms: default_sampling_debounce_ms(),
            beam_debounce_ms: default_beam_debounce_ms(),
            autoplay_interval_ms: default_autoplay_interval_ms(),
            selection_feedback_ms: default_selection_feedback_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoPlayConfig {
    /// Consecutive candidate fetch failures that stop auto-play
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

fn default_max_consecutive_errors() -> u32 { 2 }

impl Default for AutoPlayConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BeamConfig {
    #[serde(default = "default_num_paths")]
    pub num_paths: u32,

    /// Tokens per generated path, and per extension step
    #[serde(default = "default_depth")]
    pub depth: u32,
}

fn default_num_paths() -> u32 { 3 }
fn default_depth() -> u32 { 5 }

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            num_paths: default_num_paths(),
            depth: default_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub system_prompt: String,

    #[serde(default = "chat::default_end_markers")]
    pub end_markers: Vec<String>,

    /// Start auto-play when a user turn is sent
    #[serde(default = "default_auto_generate")]
    pub auto_generate: bool,
}

fn default_auto_generate() -> bool { true }

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            end_markers: chat::default_end_markers(),
            auto_generate: default_auto_generate(),
        }
    }
}
