pub mod base;
pub mod openai;

pub use base::{BaseSTT, STTError, STTResult};
pub use openai::OpenAICompatibleSTT;
