//! OpenAI-compatible `audio/transcriptions` adapter.
//!
//! Utterances are wrapped in a WAV container and uploaded as multipart form
//! data. Works with OpenAI, whisper.cpp server, faster-whisper-server and other
//! backends exposing the same route.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use super::base::{BaseSTT, STTError, STTResult};
use crate::core::audio::{CAPTURE_CHANNELS, CAPTURE_SAMPLE_RATE, encode_wav};
use crate::core::session::{BackendCredentials, SessionSettings};

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct OpenAICompatibleSTT {
    client: reqwest::Client,
    credentials: BackendCredentials,
}

impl OpenAICompatibleSTT {
    pub fn new(credentials: BackendCredentials, timeout: Duration) -> Result<Self, STTError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| STTError::ConnectionFailed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            credentials,
        })
    }
}

#[async_trait]
impl BaseSTT for OpenAICompatibleSTT {
    async fn transcribe(
        &self,
        audio: &[i16],
        settings: &SessionSettings,
    ) -> Result<STTResult, STTError> {
        if audio.is_empty() {
            return Err(STTError::InvalidAudioFormat("empty utterance".to_string()));
        }

        let wav = encode_wav(audio, CAPTURE_SAMPLE_RATE, CAPTURE_CHANNELS);
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| STTError::AudioProcessingError(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", settings.stt_model.clone())
            .text("response_format", "json");
        if let Some(language) = &settings.language {
            form = form.text("language", language.clone());
        }

        let url = settings.endpoint("audio/transcriptions");
        debug!(
            "STT request to {} ({} samples, model={})",
            url,
            audio.len(),
            settings.stt_model
        );

        let mut builder = self.client.post(&url).multipart(form);
        if let Some(key) = self.credentials.key_for(&settings.backend) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                STTError::ConnectionFailed(e.to_string())
            } else {
                STTError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("STT backend returned {}: {}", status, text);
            return Err(match status.as_u16() {
                401 | 403 => STTError::AuthenticationFailed(text),
                _ => STTError::ProviderError(format!("HTTP {status}: {text}")),
            });
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| STTError::ProviderError(format!("Invalid transcription response: {e}")))?;

        Ok(STTResult::final_text(body.text.trim()))
    }

    fn get_provider_info(&self) -> &'static str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_audio_rejected_without_request() {
        let stt = OpenAICompatibleSTT::new(BackendCredentials::anonymous(), Duration::from_secs(1))
            .unwrap();
        let err = stt
            .transcribe(&[], &SessionSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, STTError::InvalidAudioFormat(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_an_error() {
        let stt = OpenAICompatibleSTT::new(BackendCredentials::anonymous(), Duration::from_secs(2))
            .unwrap();
        let settings = SessionSettings {
            backend: "http://127.0.0.1:9/v1".to_string(),
            ..Default::default()
        };
        let result = stt.transcribe(&[0; 1600], &settings).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_transcription_response_parse() {
        let body: TranscriptionResponse =
            serde_json::from_str(r#"{"text":" hello world ","language":"en"}"#).unwrap();
        assert_eq!(body.text, " hello world ");
    }
}
