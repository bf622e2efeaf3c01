use serde::Deserialize;
use std::path::Path;

use super::{ConfigError, ConfigResult};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables can override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// backend:
///   url: "http://localhost:8000/v1"
///   api_key: "your-api-key"
///   request_timeout_seconds: 30
///
/// session:
///   stt_model: "whisper-1"
///   llm_model: "gpt-4o-mini"
///   tts_model: "tts-1"
///   tts_voice: "alloy"
///   system_prompt: "You are a helpful voice assistant."
///
/// vad:
///   threshold: 0.02
///   hangover_ms: 480
///   min_utterance_ms: 500
///   max_utterance_ms: 30000
///
/// tools:
///   enabled: true
///   max_iterations: 5
///   call_buffer_limit: 65536
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub backend: Option<BackendYaml>,
    pub session: Option<SessionYaml>,
    pub vad: Option<VadYaml>,
    pub tools: Option<ToolsYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// OpenAI-compatible backend from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

/// Defaults applied to every new session
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub stt_model: Option<String>,
    pub llm_model: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VadYaml {
    pub threshold: Option<f32>,
    pub hangover_ms: Option<u64>,
    pub min_utterance_ms: Option<u64>,
    pub max_utterance_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsYaml {
    pub enabled: Option<bool>,
    pub max_iterations: Option<usize>,
    pub call_buffer_limit: Option<usize>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
