use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool description advertised to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: Value,
}

/// What a tool returns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolOutput {
    /// Result text fed back to the model and recorded in history
    pub text: String,
    /// Optional structured payload for client-side display
    pub display: Option<Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            display: None,
        }
    }

    pub fn with_display(mut self, display: Value) -> Self {
        self.display = Some(display);
        self
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Tool {tool} failed: {reason}")]
    ExecutionFailed { tool: String, reason: String },
}

/// Runs tools on behalf of the pipeline.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools the model may call.
    fn catalog(&self) -> Vec<ToolSpec>;

    async fn invoke(&self, name: &str, arguments: &Value) -> Result<ToolOutput, ToolError>;
}

/// A single tool registered in a [`super::ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn call(&self, arguments: &Value) -> Result<ToolOutput, ToolError>;
}
