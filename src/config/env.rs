use super::merge::merge_config;
use super::validation::validate;
use super::{ConfigResult, ServerConfig};

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with sensible defaults.
    /// Also loads from .env file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or the resulting
    /// configuration fails validation.
    pub fn from_env() -> ConfigResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = merge_config(None)?;
        validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::config::merge::ENV_KEYS;
    use serial_test::serial;
    use std::env;

    fn cleanup_env_vars() {
        unsafe {
            for key in ENV_KEYS {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.max_tool_iterations, 5);
        assert!(config.tools_enabled);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_all_sections() {
        cleanup_env_vars();

        unsafe {
            env::set_var("HOST", "127.0.0.1");
            env::set_var("PORT", "9001");
            env::set_var("BACKEND_URL", "https://api.example.com/v1");
            env::set_var("BACKEND_API_KEY", "sk-test");
            env::set_var("TTS_VOICE", "shimmer");
            env::set_var("VAD_THRESHOLD", "0.03");
            env::set_var("VAD_HANGOVER_MS", "320");
            env::set_var("MAX_TOOL_ITERATIONS", "3");
            env::set_var("REQUEST_TIMEOUT_SECONDS", "10");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.address(), "127.0.0.1:9001");
        assert_eq!(config.backend_url, "https://api.example.com/v1");
        assert_eq!(config.backend_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.tts_voice, "shimmer");
        assert_eq!(config.vad_threshold, 0.03);
        assert_eq!(config.vad_hangover_ms, 320);
        assert_eq!(config.max_tool_iterations, 3);
        assert_eq!(config.request_timeout_seconds, 10);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        cleanup_env_vars();

        unsafe {
            env::set_var("PORT", "70000");
        }

        let result = ServerConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "PORT", .. })
        ));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_validation_failure() {
        cleanup_env_vars();

        unsafe {
            env::set_var("BACKEND_URL", "localhost:8000");
        }

        let result = ServerConfig::from_env();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        cleanup_env_vars();
    }
}
