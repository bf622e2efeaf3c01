//! # TTS Base Trait
//!
//! Text-to-speech engines take one reply text and return a stream of audio
//! chunks. The pipeline forwards each chunk to the client as soon as it
//! arrives, so engines should yield early rather than buffer the whole reply.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use parley::core::tts::{BaseTTS, OpenAICompatibleTTS};
//!
//! async fn speak(tts: &OpenAICompatibleTTS, settings: &SessionSettings) -> Result<(), TTSError> {
//!     let mut chunks = tts.synthesize("Hello there", settings).await?;
//!     while let Some(chunk) = chunks.next().await {
//!         let chunk = chunk?;
//!         println!("{} bytes of {} at {} Hz", chunk.data.len(), chunk.format, chunk.sample_rate);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::core::session::SessionSettings;

/// Audio data structure for TTS output
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    /// Audio bytes in the format specified by the engine
    pub data: Vec<u8>,
    /// Sample rate of the audio
    pub sample_rate: u32,
    /// Audio format (e.g., "pcm16", "wav")
    pub format: String,
    /// Duration of the audio chunk in milliseconds
    pub duration_ms: Option<u32>,
}

impl AudioData {
    /// Mono PCM16 little-endian chunk.
    pub fn pcm16(data: Vec<u8>, sample_rate: u32) -> Self {
        let duration_ms = if sample_rate > 0 {
            Some(((data.len() / 2) as u64 * 1000 / sample_rate as u64) as u32)
        } else {
            None
        };
        Self {
            data,
            sample_rate,
            format: "pcm16".to_string(),
            duration_ms,
        }
    }
}

/// TTS-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum TTSError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Audio generation failed: {0}")]
    AudioGenerationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),
}

pub type TTSResult<T> = Result<T, TTSError>;

/// Stream of synthesized chunks, in playback order.
pub type AudioStream = BoxStream<'static, TTSResult<AudioData>>;

#[async_trait]
pub trait BaseTTS: Send + Sync {
    /// Synthesize `text` into a stream of audio chunks.
    async fn synthesize(&self, text: &str, settings: &SessionSettings) -> TTSResult<AudioStream>;

    /// Get provider-specific information
    fn get_provider_info(&self) -> &'static str;
}
