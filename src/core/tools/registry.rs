use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::base::{Tool, ToolError, ToolExecutor, ToolOutput, ToolSpec};

/// Name-indexed set of tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CurrentTimeTool));
        registry
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            info!("Replaced tool '{}'", name);
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn catalog(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec()).collect()
    }

    async fn invoke(&self, name: &str, arguments: &Value) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        debug!("Invoking tool '{}' with {}", name, arguments);
        tool.call(arguments).await
    }
}

/// Reports the current UTC date and time.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_current_time".to_string(),
            description: "Get the current date and time in UTC".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, arguments: &Value) -> Result<ToolOutput, ToolError> {
        if !arguments.is_object() {
            return Err(ToolError::InvalidArguments {
                tool: "get_current_time".to_string(),
                reason: "arguments must be an object".to_string(),
            });
        }
        let formatted = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(ToolOutput::text(formatted.clone()).with_display(json!({ "utc": formatted })))
    }
}
