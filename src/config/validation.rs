use super::{ConfigError, ConfigResult, ServerConfig};
use crate::core::session::validate_backend;

/// Smallest tool-call buffer that can hold a realistic call.
const MIN_TOOL_CALL_BUFFER: usize = 64;

/// Validate a fully merged configuration
///
/// Checks that:
/// - the backend URL is an http(s) URL
/// - the VAD threshold lies strictly between 0 and 1
/// - the minimum utterance length is below the maximum
/// - the pipeline bounds are usable
pub fn validate(config: &ServerConfig) -> ConfigResult<()> {
    validate_backend(&config.backend_url).map_err(|e| ConfigError::Invalid(e.to_string()))?;

    if !(config.vad_threshold > 0.0 && config.vad_threshold < 1.0) {
        return Err(ConfigError::Invalid(format!(
            "VAD_THRESHOLD must be between 0 and 1 (exclusive), got {}",
            config.vad_threshold
        )));
    }

    validate_utterance_bounds(config.min_utterance_ms, config.max_utterance_ms)?;

    if config.max_tool_iterations == 0 {
        return Err(ConfigError::Invalid(
            "MAX_TOOL_ITERATIONS must be at least 1".to_string(),
        ));
    }

    if config.tool_call_buffer_limit < MIN_TOOL_CALL_BUFFER {
        return Err(ConfigError::Invalid(format!(
            "TOOL_CALL_BUFFER_LIMIT must be at least {MIN_TOOL_CALL_BUFFER} bytes, got {}",
            config.tool_call_buffer_limit
        )));
    }

    if config.request_timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "REQUEST_TIMEOUT_SECONDS must be at least 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_utterance_bounds(min_ms: u64, max_ms: u64) -> ConfigResult<()> {
    if min_ms >= max_ms {
        return Err(ConfigError::Invalid(format!(
            "MIN_UTTERANCE_MS ({min_ms}) must be less than MAX_UTTERANCE_MS ({max_ms})"
        )));
    }
    Ok(())
}
