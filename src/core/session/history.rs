//! Conversation history: insertion-ordered, append-only except for clear.

use serde::{Deserialize, Serialize};

use crate::core::llm::ToolCall;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// For tool turns: the invocation whose result `text` holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into(), None)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text.into(), None)
    }

    pub fn tool(call: ToolCall, result: impl Into<String>) -> Self {
        Self::new(Role::Tool, result.into(), Some(call))
    }

    fn new(role: Role, text: String, tool_call: Option<ToolCall>) -> Self {
        Self {
            role,
            text,
            timestamp: now_ms(),
            tool_call,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Owned copy handed to a pipeline run.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
