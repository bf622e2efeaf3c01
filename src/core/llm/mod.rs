pub mod base;
pub mod openai;
pub mod tool_call;

pub use base::{BaseLLM, LLMError, LLMRequest, LLMResult, LLMStream, LLMToken};
pub use openai::OpenAICompatibleLLM;
pub use tool_call::{DEFAULT_MAX_BUFFER_LEN, ReconstructorEvent, ToolCall, ToolCallReconstructor};
