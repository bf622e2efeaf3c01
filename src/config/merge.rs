use std::env;

use super::utils::{env_bool, env_parsed};
use super::yaml::YamlConfig;
use super::{ConfigResult, ServerConfig};

/// Every environment variable the server reads.
pub const ENV_KEYS: [&str; 17] = [
    "HOST",
    "PORT",
    "BACKEND_URL",
    "BACKEND_API_KEY",
    "STT_MODEL",
    "LLM_MODEL",
    "TTS_MODEL",
    "TTS_VOICE",
    "SYSTEM_PROMPT",
    "VAD_THRESHOLD",
    "VAD_HANGOVER_MS",
    "MIN_UTTERANCE_MS",
    "MAX_UTTERANCE_MS",
    "MAX_TOOL_ITERATIONS",
    "TOOL_CALL_BUFFER_LIMIT",
    "REQUEST_TIMEOUT_SECONDS",
    "TOOLS_ENABLED",
];

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. Environment variables
/// 2. YAML configuration values
/// 3. Default values
///
/// Validation is left to the caller.
pub fn merge_config(yaml_config: Option<YamlConfig>) -> ConfigResult<ServerConfig> {
    let yaml = yaml_config.unwrap_or_default();
    let defaults = ServerConfig::default();

    // ENV > YAML > default for strings
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env::var($env_var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or($yaml_value)
                .unwrap_or($default)
        };
    }

    // ENV > YAML for optional strings
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            env::var($env_var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or($yaml_value)
        };
    }

    // ENV > YAML > default for parsed values
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env_parsed($env_var)?.or($yaml_value).unwrap_or($default)
        };
    }

    let server = yaml.server.unwrap_or_default();
    let backend = yaml.backend.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let vad = yaml.vad.unwrap_or_default();
    let tools = yaml.tools.unwrap_or_default();

    Ok(ServerConfig {
        host: get_value!("HOST", server.host, defaults.host),
        port: get_parsed!("PORT", server.port, defaults.port),

        backend_url: get_value!("BACKEND_URL", backend.url, defaults.backend_url),
        backend_api_key: get_optional!("BACKEND_API_KEY", backend.api_key),
        request_timeout_seconds: get_parsed!(
            "REQUEST_TIMEOUT_SECONDS",
            backend.request_timeout_seconds,
            defaults.request_timeout_seconds
        ),

        stt_model: get_value!("STT_MODEL", session.stt_model, defaults.stt_model),
        llm_model: get_value!("LLM_MODEL", session.llm_model, defaults.llm_model),
        tts_model: get_value!("TTS_MODEL", session.tts_model, defaults.tts_model),
        tts_voice: get_value!("TTS_VOICE", session.tts_voice, defaults.tts_voice),
        system_prompt: get_optional!("SYSTEM_PROMPT", session.system_prompt),

        vad_threshold: get_parsed!("VAD_THRESHOLD", vad.threshold, defaults.vad_threshold),
        vad_hangover_ms: get_parsed!("VAD_HANGOVER_MS", vad.hangover_ms, defaults.vad_hangover_ms),
        min_utterance_ms: get_parsed!(
            "MIN_UTTERANCE_MS",
            vad.min_utterance_ms,
            defaults.min_utterance_ms
        ),
        max_utterance_ms: get_parsed!(
            "MAX_UTTERANCE_MS",
            vad.max_utterance_ms,
            defaults.max_utterance_ms
        ),

        max_tool_iterations: get_parsed!(
            "MAX_TOOL_ITERATIONS",
            tools.max_iterations,
            defaults.max_tool_iterations
        ),
        tool_call_buffer_limit: get_parsed!(
            "TOOL_CALL_BUFFER_LIMIT",
            tools.call_buffer_limit,
            defaults.tool_call_buffer_limit
        ),
        tools_enabled: env_bool("TOOLS_ENABLED")?
            .or(tools.enabled)
            .unwrap_or(defaults.tools_enabled),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::{BackendYaml, ServerYaml, ToolsYaml, VadYaml};
    use serial_test::serial;

    fn cleanup_env_vars() {
        unsafe {
            for key in ENV_KEYS {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_merge_defaults_only() {
        cleanup_env_vars();

        let config = merge_config(None).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    #[serial]
    fn test_merge_yaml_values() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                host: Some("127.0.0.1".to_string()),
                port: Some(4000),
            }),
            backend: Some(BackendYaml {
                url: Some("https://api.example.com/v1".to_string()),
                api_key: None,
                request_timeout_seconds: Some(5),
            }),
            vad: Some(VadYaml {
                threshold: Some(0.1),
                ..Default::default()
            }),
            tools: Some(ToolsYaml {
                enabled: Some(false),
                max_iterations: Some(2),
                call_buffer_limit: None,
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 4000);
        assert_eq!(config.backend_url, "https://api.example.com/v1");
        assert_eq!(config.backend_api_key, None);
        assert_eq!(config.request_timeout_seconds, 5);
        assert_eq!(config.vad_threshold, 0.1);
        assert!(!config.tools_enabled);
        assert_eq!(config.max_tool_iterations, 2);
        assert_eq!(
            config.tool_call_buffer_limit,
            ServerConfig::default().tool_call_buffer_limit
        );
    }

    #[test]
    #[serial]
    fn test_merge_env_overrides_yaml() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            server: Some(ServerYaml {
                host: None,
                port: Some(4000),
            }),
            vad: Some(VadYaml {
                min_utterance_ms: Some(800),
                ..Default::default()
            }),
            ..Default::default()
        };

        unsafe {
            env::set_var("PORT", "5000");
            env::set_var("MIN_UTTERANCE_MS", "250");
            env::set_var("TOOLS_ENABLED", "false");
            env::set_var("SYSTEM_PROMPT", "Answer in one sentence.");
        }

        let config = merge_config(Some(yaml)).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.min_utterance_ms, 250);
        assert!(!config.tools_enabled);
        assert_eq!(
            config.system_prompt.as_deref(),
            Some("Answer in one sentence.")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_invalid_env_number() {
        cleanup_env_vars();

        unsafe {
            env::set_var("MAX_UTTERANCE_MS", "thirty seconds");
        }

        let err = merge_config(None).unwrap_err();
        assert!(err.to_string().contains("MAX_UTTERANCE_MS"));

        cleanup_env_vars();
    }
}
