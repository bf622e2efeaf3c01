pub mod base;
pub mod openai;

pub use base::{AudioData, AudioStream, BaseTTS, TTSError, TTSResult};
pub use openai::{OpenAICompatibleTTS, SPEECH_SAMPLE_RATE};
