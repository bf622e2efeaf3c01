//! Per-session engine selection.
//!
//! Every session owns its own [`SessionSettings`] value. Engines receive it by
//! reference on every call; nothing is shared between sessions.

use serde::{Deserialize, Serialize};

/// Errors raised when a client settings update is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidBackend { url: String, reason: String },
    #[error("Setting '{0}' must not be empty")]
    Empty(&'static str),
}

/// Engine selection for one session. Opaque to the session engine; passed
/// through to the STT, LLM and TTS adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Base URL of the OpenAI-compatible backend
    pub backend: String,
    /// Language model name
    pub model: String,
    /// Transcription model name
    pub stt_model: String,
    /// Speech synthesis model name
    pub tts_model: String,
    /// Synthesis voice
    pub voice: String,
    /// System prompt prepended to the conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Transcription language hint (ISO-639-1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            backend: "http://localhost:8000/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            system_prompt: None,
            language: None,
        }
    }
}

/// Partial update sent by a client in a `settings` message. Absent fields keep
/// their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == SettingsUpdate::default()
    }
}

impl From<&SessionSettings> for SettingsUpdate {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            backend: Some(settings.backend.clone()),
            model: Some(settings.model.clone()),
            stt_model: Some(settings.stt_model.clone()),
            tts_model: Some(settings.tts_model.clone()),
            voice: Some(settings.voice.clone()),
            system_prompt: settings.system_prompt.clone(),
            language: settings.language.clone(),
        }
    }
}

impl SessionSettings {
    /// Apply a partial update. The update is validated first and applied
    /// all-or-nothing.
    pub fn apply(&mut self, update: SettingsUpdate) -> Result<(), SettingsError> {
        if let Some(backend) = &update.backend {
            validate_backend(backend)?;
        }
        for (name, value) in [
            ("model", &update.model),
            ("stt_model", &update.stt_model),
            ("tts_model", &update.tts_model),
            ("voice", &update.voice),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(SettingsError::Empty(name));
            }
        }

        if let Some(backend) = update.backend {
            self.backend = backend.trim_end_matches('/').to_string();
        }
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(stt_model) = update.stt_model {
            self.stt_model = stt_model;
        }
        if let Some(tts_model) = update.tts_model {
            self.tts_model = tts_model;
        }
        if let Some(voice) = update.voice {
            self.voice = voice;
        }
        if let Some(prompt) = update.system_prompt {
            self.system_prompt = if prompt.trim().is_empty() {
                None
            } else {
                Some(prompt)
            };
        }
        if let Some(language) = update.language {
            self.language = if language.trim().is_empty() {
                None
            } else {
                Some(language)
            };
        }
        Ok(())
    }

    /// Join a path onto the backend base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.backend.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Server API key bound to the configured backend.
///
/// Clients may point a session at any backend, but the key is only attached
/// to requests whose backend matches the one it was configured for.
#[derive(Clone, Default)]
pub struct BackendCredentials {
    backend: String,
    api_key: Option<String>,
}

impl BackendCredentials {
    pub fn new(backend: &str, api_key: Option<String>) -> Self {
        Self {
            backend: normalize_backend(backend),
            api_key,
        }
    }

    /// Credentials that never attach a key.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The key to send to `backend`, if any.
    pub fn key_for(&self, backend: &str) -> Option<&str> {
        let key = self.api_key.as_deref()?;
        (normalize_backend(backend) == self.backend).then_some(key)
    }
}

impl std::fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("backend", &self.backend)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn normalize_backend(backend: &str) -> String {
    let trimmed = backend.trim().trim_end_matches('/');
    match url::Url::parse(trimmed) {
        Ok(parsed) => parsed.as_str().trim_end_matches('/').to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Backend URLs must be absolute http(s) URLs.
pub fn validate_backend(backend: &str) -> Result<(), SettingsError> {
    let parsed = url::Url::parse(backend).map_err(|e| SettingsError::InvalidBackend {
        url: backend.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SettingsError::InvalidBackend {
            url: backend.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_partial_update() {
        let mut settings = SessionSettings::default();
        settings
            .apply(SettingsUpdate {
                voice: Some("nova".to_string()),
                backend: Some("https://api.example.com/v1/".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(settings.voice, "nova");
        assert_eq!(settings.backend, "https://api.example.com/v1");
        assert_eq!(settings.model, SessionSettings::default().model);
    }

    #[test]
    fn test_apply_rejects_bad_backend_without_partial_changes() {
        let mut settings = SessionSettings::default();
        let err = settings
            .apply(SettingsUpdate {
                voice: Some("nova".to_string()),
                backend: Some("ftp://example.com".to_string()),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, SettingsError::InvalidBackend { .. }));
        assert_eq!(settings.voice, "alloy");
    }

    #[test]
    fn test_apply_rejects_empty_model() {
        let mut settings = SessionSettings::default();
        let err = settings
            .apply(SettingsUpdate {
                model: Some("  ".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err, SettingsError::Empty("model"));
    }

    #[test]
    fn test_empty_prompt_clears_it() {
        let mut settings = SessionSettings {
            system_prompt: Some("be brief".to_string()),
            ..Default::default()
        };
        settings
            .apply(SettingsUpdate {
                system_prompt: Some(String::new()),
                ..Default::default()
            })
            .unwrap();
        assert!(settings.system_prompt.is_none());
    }

    #[test]
    fn test_endpoint_join() {
        let settings = SessionSettings {
            backend: "http://localhost:8000/v1/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.endpoint("/chat/completions"),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_credentials_only_released_to_configured_backend() {
        let creds = BackendCredentials::new("https://api.example.com/v1/", Some("sk-1".to_string()));

        assert_eq!(creds.key_for("https://api.example.com/v1"), Some("sk-1"));
        assert_eq!(creds.key_for("HTTPS://API.example.com:443/v1/"), Some("sk-1"));
        assert_eq!(creds.key_for("http://evil.example.com/v1"), None);
        assert_eq!(creds.key_for("https://api.example.com/v2"), None);
        assert_eq!(creds.key_for("https://api.example.com.evil.io/v1"), None);
        assert_eq!(BackendCredentials::anonymous().key_for(""), None);
        assert!(!format!("{creds:?}").contains("sk-1"));
    }

    #[test]
    fn test_update_deserializes_from_partial_json() {
        let update: SettingsUpdate = serde_json::from_str(r#"{"voice":"echo"}"#).unwrap();
        assert_eq!(update.voice.as_deref(), Some("echo"));
        assert!(update.model.is_none());
        assert!(!update.is_empty());
    }
}
