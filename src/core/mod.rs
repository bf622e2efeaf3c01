pub mod audio;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod stt;
pub mod tools;
pub mod tts;
pub mod vad;

// Re-export commonly used types for convenience
pub use audio::{AudioFrame, FrameAssembler, FrameError, FrameFlag};
pub use llm::{BaseLLM, LLMError, LLMToken, OpenAICompatibleLLM, ToolCall, ToolCallReconstructor};
pub use pipeline::{
    Engines, ExecutionLock, PipelineConfig, PipelineCoordinator, PipelineError, RunEvent,
};
pub use session::{
    Role, Session, SessionCommand, SessionConfig, SessionHandle, SessionOutput, SessionSettings,
    SessionState, Turn,
};
pub use stt::{BaseSTT, OpenAICompatibleSTT, STTError, STTResult};
pub use tools::{ToolExecutor, ToolRegistry, ToolSpec};
pub use tts::{AudioData, BaseTTS, OpenAICompatibleTTS, TTSError};
pub use vad::{EnergyVAD, GateConfig, VADFactory, VoiceActivityDetector, VoiceActivityGate};
