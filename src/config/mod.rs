//! Configuration module for the Parley server
//!
//! This module handles server configuration from various sources: YAML files and
//! environment variables. Environment variables always override YAML values.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use parley::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use validation::validate;

use crate::core::pipeline::PipelineConfig;
use crate::core::session::SessionSettings;
use crate::core::vad::{EnergyVADConfig, GateConfig};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    ReadFile { path: String, reason: String },

    #[error("Failed to parse YAML: {0}")]
    Parse(String),

    #[error("Invalid {key} value '{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Server configuration
///
/// Contains everything needed to run the server:
/// - Listen address
/// - The OpenAI-compatible backend and its API key
/// - Default engine selection for new sessions
/// - Voice activity detection and utterance limits
/// - Pipeline bounds
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Backend
    pub backend_url: String,
    pub backend_api_key: Option<String>,
    pub request_timeout_seconds: u64,

    // Session defaults
    pub stt_model: String,
    pub llm_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub system_prompt: Option<String>,

    // Voice activity detection
    pub vad_threshold: f32,
    pub vad_hangover_ms: u64,
    pub min_utterance_ms: u64,
    pub max_utterance_ms: u64,

    // Pipeline
    pub max_tool_iterations: usize,
    pub tool_call_buffer_limit: usize,
    pub tools_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = SessionSettings::default();
        let gate = GateConfig::default();
        let pipeline = PipelineConfig::default();

        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            backend_url: settings.backend,
            backend_api_key: None,
            request_timeout_seconds: 30,
            stt_model: settings.stt_model,
            llm_model: settings.model,
            tts_model: settings.tts_model,
            tts_voice: settings.voice,
            system_prompt: None,
            vad_threshold: EnergyVADConfig::default().threshold,
            vad_hangover_ms: gate.hangover_ms,
            min_utterance_ms: gate.min_utterance_ms,
            max_utterance_ms: gate.max_utterance_ms,
            max_tool_iterations: pipeline.max_tool_iterations,
            tool_call_buffer_limit: pipeline.tool_call_buffer_limit,
            tools_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// The `.env` file is not read here: the YAML file is the source of truth
    /// and only real environment variables override it.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings every new session starts with.
    pub fn default_settings(&self) -> SessionSettings {
        SessionSettings {
            backend: self.backend_url.trim_end_matches('/').to_string(),
            model: self.llm_model.clone(),
            stt_model: self.stt_model.clone(),
            tts_model: self.tts_model.clone(),
            voice: self.tts_voice.clone(),
            system_prompt: self.system_prompt.clone(),
            language: None,
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig::default()
            .with_hangover_ms(self.vad_hangover_ms)
            .with_min_utterance_ms(self.min_utterance_ms)
            .with_max_utterance_ms(self.max_utterance_ms)
    }

    pub fn vad_config(&self) -> EnergyVADConfig {
        EnergyVADConfig {
            threshold: self.vad_threshold,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_tool_iterations: self.max_tool_iterations,
            tool_call_buffer_limit: self.tool_call_buffer_limit,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
