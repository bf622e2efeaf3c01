//! Error types for pipeline runs

use crate::core::{llm::LLMError, stt::STTError, tools::ToolError, tts::TTSError};

/// Error types for pipeline runs
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("A pipeline run is already active for this session")]
    AlreadyRunning,
    #[error("Pipeline run cancelled")]
    Cancelled,
    #[error("STT error: {0}")]
    STTError(#[from] STTError),
    #[error("LLM error: {0}")]
    LLMError(#[from] LLMError),
    #[error("TTS error: {0}")]
    TTSError(#[from] TTSError),
    #[error("Tool error: {0}")]
    ToolError(#[from] ToolError),
}

/// Result type for pipeline runs
pub type PipelineResult<T> = Result<T, PipelineError>;
