//! OpenAI-compatible `audio/speech` adapter.
//!
//! Requests raw PCM and re-chunks the response body into fixed-duration
//! chunks so the client receives audio while the backend is still
//! synthesizing.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, error};

use super::base::{AudioData, AudioStream, BaseTTS, TTSError, TTSResult};
use crate::core::audio::wav::{WAV_HEADER_SIZE, strip_wav_header};
use crate::core::session::{BackendCredentials, SessionSettings};

/// OpenAI `response_format=pcm` is 24 kHz mono PCM16.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

const DEFAULT_CHUNK_MS: u32 = 200;

pub struct OpenAICompatibleTTS {
    client: reqwest::Client,
    credentials: BackendCredentials,
    sample_rate: u32,
    chunk_ms: u32,
}

impl OpenAICompatibleTTS {
    pub fn new(credentials: BackendCredentials, connect_timeout: Duration) -> TTSResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TTSError::ConnectionFailed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            credentials,
            sample_rate: SPEECH_SAMPLE_RATE,
            chunk_ms: DEFAULT_CHUNK_MS,
        })
    }

    pub fn with_chunk_ms(mut self, chunk_ms: u32) -> Self {
        self.chunk_ms = chunk_ms.max(10);
        self
    }
}

#[async_trait]
impl BaseTTS for OpenAICompatibleTTS {
    async fn synthesize(&self, text: &str, settings: &SessionSettings) -> TTSResult<AudioStream> {
        let url = settings.endpoint("audio/speech");
        let body = json!({
            "model": settings.tts_model,
            "voice": settings.voice,
            "input": text,
            "response_format": "pcm",
        });
        debug!(
            "TTS request to {} ({} chars, voice={})",
            url,
            text.len(),
            settings.voice
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = self.credentials.key_for(&settings.backend) {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| TTSError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("TTS backend returned {}: {}", status, text);
            return Err(TTSError::ProviderError(format!("HTTP {status}: {text}")));
        }

        let sample_rate = self.sample_rate;
        let rechunker = PcmRechunker::new(sample_rate, self.chunk_ms);
        let bytes = response.bytes_stream().boxed();

        let stream = futures::stream::unfold(
            (bytes, rechunker, Vec::<Vec<u8>>::new().into_iter(), false),
            move |(mut bytes, mut rechunker, mut ready, mut ended)| async move {
                loop {
                    if let Some(chunk) = ready.next() {
                        let item = Ok(AudioData::pcm16(chunk, sample_rate));
                        return Some((item, (bytes, rechunker, ready, ended)));
                    }
                    if ended {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(data)) => ready = rechunker.push(&data).into_iter(),
                        Some(Err(e)) => {
                            error!("Failed to read audio chunk: {}", e);
                            ended = true;
                            let item = Err(TTSError::AudioGenerationFailed(format!(
                                "Failed to read audio: {e}"
                            )));
                            return Some((item, (bytes, rechunker, ready, ended)));
                        }
                        None => {
                            ended = true;
                            ready = rechunker.flush().into_iter().collect::<Vec<_>>().into_iter();
                        }
                    }
                }
            },
        );

        Ok(stream.boxed())
    }

    fn get_provider_info(&self) -> &'static str {
        "openai-compatible"
    }
}

/// Aggregates a PCM16 byte stream into fixed-size, sample-aligned chunks.
#[derive(Debug)]
pub(crate) struct PcmRechunker {
    chunk_bytes: usize,
    buffer: Vec<u8>,
    header_checked: bool,
}

impl PcmRechunker {
    pub(crate) fn new(sample_rate: u32, chunk_ms: u32) -> Self {
        let bytes = (sample_rate as usize * 2 * chunk_ms as usize / 1000).max(2);
        Self {
            chunk_bytes: bytes - bytes % 2,
            buffer: Vec::with_capacity(bytes),
            header_checked: false,
        }
    }

    pub(crate) fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);
        if !self.header_checked {
            // Some servers ignore response_format=pcm and send WAV
            if self.buffer.len() <= WAV_HEADER_SIZE {
                return Vec::new();
            }
            self.strip_header();
        }

        let mut out = Vec::new();
        while self.buffer.len() >= self.chunk_bytes {
            out.push(self.buffer.drain(..self.chunk_bytes).collect());
        }
        out
    }

    pub(crate) fn flush(&mut self) -> Option<Vec<u8>> {
        if !self.header_checked {
            self.strip_header();
        }
        let mut rest = std::mem::take(&mut self.buffer);
        if rest.len() % 2 == 1 {
            rest.pop();
        }
        (!rest.is_empty()).then_some(rest)
    }

    fn strip_header(&mut self) {
        let header = self.buffer.len() - strip_wav_header(&self.buffer).len();
        self.buffer.drain(..header);
        self.header_checked = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::encode_wav;

    #[test]
    fn test_rechunker_fixed_chunks() {
        let mut r = PcmRechunker::new(24_000, 200);
        assert!(r.push(&[0; 100]).is_empty());
        let chunks = r.push(&[0; 20_000]);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 9_600));
        assert_eq!(r.flush().map(|c| c.len()), Some(20_100 - 19_200));
    }

    #[test]
    fn test_rechunker_drops_trailing_odd_byte() {
        let mut r = PcmRechunker::new(24_000, 200);
        r.push(&[0; 101]);
        assert_eq!(r.flush().map(|c| c.len()), Some(100));
        assert_eq!(r.flush(), None);
    }

    #[test]
    fn test_rechunker_strips_wav_header() {
        let wav = encode_wav(&[7; 100], 24_000, 1);
        let mut r = PcmRechunker::new(24_000, 200);
        assert!(r.push(&wav).is_empty());
        let rest = r.flush().unwrap();
        assert_eq!(rest.len(), 200);
        assert_eq!(&rest[..2], &7i16.to_le_bytes());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_an_error() {
        let tts = OpenAICompatibleTTS::new(BackendCredentials::anonymous(), Duration::from_secs(2))
            .unwrap();
        let settings = SessionSettings {
            backend: "http://127.0.0.1:9/v1".to_string(),
            ..Default::default()
        };
        assert!(tts.synthesize("hi", &settings).await.is_err());
    }
}
