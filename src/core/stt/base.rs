use async_trait::async_trait;

use crate::core::session::SessionSettings;

/// Result structure containing transcription data from STT engines
#[derive(Debug, Clone, PartialEq)]
pub struct STTResult {
    /// The transcribed text from the audio
    pub transcript: String,
    /// Whether this is a final transcription result (not an interim result)
    pub is_final: bool,
    /// Confidence score of the transcription (0.0 to 1.0)
    pub confidence: f32,
}

impl STTResult {
    pub fn new(transcript: String, is_final: bool, confidence: f32) -> Self {
        Self {
            transcript,
            is_final,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Final result with full confidence, for engines that do not report one.
    pub fn final_text(transcript: impl Into<String>) -> Self {
        Self::new(transcript.into(), true, 1.0)
    }

    /// True when nothing was recognized.
    pub fn is_empty(&self) -> bool {
        self.transcript.trim().is_empty()
    }
}

/// Error types for STT operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum STTError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),
}

/// Speech-to-text engine. One call transcribes one complete utterance of
/// 16 kHz mono PCM16 audio.
#[async_trait]
pub trait BaseSTT: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[i16],
        settings: &SessionSettings,
    ) -> Result<STTResult, STTError>;

    /// Get provider-specific information
    fn get_provider_info(&self) -> &'static str;
}
