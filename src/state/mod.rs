use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ServerConfig;
use crate::core::llm::OpenAICompatibleLLM;
use crate::core::pipeline::{Engines, PipelineCoordinator, PipelineError};
use crate::core::session::{BackendCredentials, SessionConfig};
use crate::core::stt::OpenAICompatibleSTT;
use crate::core::tools::ToolRegistry;
use crate::core::tts::OpenAICompatibleTTS;
use crate::core::vad::{EnergyVAD, VADFactory, VoiceActivityDetector};

/// Application state that can be shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    /// Runs conversational turns; shared by every session
    pub coordinator: PipelineCoordinator,
    /// Builds one detector per session
    pub vad_factory: VADFactory,
    active_sessions: AtomicUsize,
}

impl AppState {
    /// Build the state with the OpenAI-compatible engines described by `config`.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, PipelineError> {
        let timeout = config.request_timeout();
        let credentials =
            BackendCredentials::new(&config.backend_url, config.backend_api_key.clone());

        let tools = if config.tools_enabled {
            ToolRegistry::with_builtins()
        } else {
            ToolRegistry::new()
        };

        let engines = Engines {
            stt: Arc::new(OpenAICompatibleSTT::new(credentials.clone(), timeout)?),
            llm: Arc::new(
                OpenAICompatibleLLM::new(credentials.clone(), timeout)?.with_idle_timeout(timeout),
            ),
            tts: Arc::new(OpenAICompatibleTTS::new(credentials, timeout)?),
            tools: Arc::new(tools),
        };

        let vad_config = config.vad_config();
        let vad_factory: VADFactory = Arc::new(move || {
            Box::new(EnergyVAD::new(vad_config)) as Box<dyn VoiceActivityDetector>
        });

        Ok(Self::with_engines(config, engines, vad_factory))
    }

    /// Build the state around caller-provided engines.
    pub fn with_engines(config: ServerConfig, engines: Engines, vad_factory: VADFactory) -> Arc<Self> {
        let coordinator = PipelineCoordinator::new(engines, config.pipeline_config());
        Arc::new(Self {
            config,
            coordinator,
            vad_factory,
            active_sessions: AtomicUsize::new(0),
        })
    }

    /// Configuration for a newly connected session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            gate: self.config.gate_config(),
            settings: self.config.default_settings(),
            ..Default::default()
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Count a session as active until the returned guard drops.
    pub fn register_session(self: &Arc<Self>) -> SessionCountGuard {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        SessionCountGuard {
            state: Arc::clone(self),
        }
    }
}

pub struct SessionCountGuard {
    state: Arc<AppState>,
}

impl Drop for SessionCountGuard {
    fn drop(&mut self) {
        self.state.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_engines_from_config() {
        let state = AppState::new(ServerConfig::default()).unwrap();
        assert_eq!(state.coordinator.config().max_tool_iterations, 5);
        assert_eq!(state.active_sessions(), 0);
    }

    #[test]
    fn test_session_config_follows_server_config() {
        let config = ServerConfig {
            tts_voice: "nova".to_string(),
            min_utterance_ms: 250,
            ..Default::default()
        };
        let state = AppState::new(config).unwrap();
        let session = state.session_config();
        assert_eq!(session.settings.voice, "nova");
        assert_eq!(session.gate.min_utterance_ms, 250);
    }

    #[test]
    fn test_session_count_guard() {
        let state = AppState::new(ServerConfig::default()).unwrap();
        let first = state.register_session();
        let second = state.register_session();
        assert_eq!(state.active_sessions(), 2);
        drop(first);
        assert_eq!(state.active_sessions(), 1);
        drop(second);
        assert_eq!(state.active_sessions(), 0);
    }
}
