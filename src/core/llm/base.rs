use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::core::session::{SessionSettings, Turn};
use crate::core::tools::ToolSpec;

/// One item of a streamed model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LLMToken {
    /// Plain response text, forwarded to the client as it arrives.
    Text(String),
    /// A fragment of tool-call JSON, fed to the reconstructor.
    ToolCall(String),
}

/// Error types for LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
}

pub type LLMResult<T> = Result<T, LLMError>;

pub type LLMStream = BoxStream<'static, LLMResult<LLMToken>>;

/// Inputs for one model invocation.
#[derive(Debug, Clone, Copy)]
pub struct LLMRequest<'a> {
    pub history: &'a [Turn],
    /// Tools the model may call. Empty disables tool calling.
    pub tools: &'a [ToolSpec],
    pub settings: &'a SessionSettings,
}

/// Streaming language model.
#[async_trait]
pub trait BaseLLM: Send + Sync {
    /// Start a completion and return the token stream.
    async fn stream(&self, request: LLMRequest<'_>) -> LLMResult<LLMStream>;

    fn get_provider_info(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct ScriptedLLM(Vec<LLMToken>);

    #[async_trait]
    impl BaseLLM for ScriptedLLM {
        async fn stream(&self, _request: LLMRequest<'_>) -> LLMResult<LLMStream> {
            Ok(futures::stream::iter(self.0.clone().into_iter().map(Ok)).boxed())
        }

        fn get_provider_info(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_scripted_stream() {
        let llm = ScriptedLLM(vec![
            LLMToken::Text("Hi".to_string()),
            LLMToken::ToolCall("{}".to_string()),
        ]);
        let settings = SessionSettings::default();
        let stream = llm
            .stream(LLMRequest {
                history: &[],
                tools: &[],
                settings: &settings,
            })
            .await
            .unwrap();
        let tokens: Vec<_> = stream.collect().await;
        assert_eq!(tokens.len(), 2);
        assert_eq!(llm.get_provider_info(), "scripted");
    }
}
