use serde_json::Value;

use crate::core::llm::ToolCall;
use crate::core::session::Turn;
use crate::core::tts::AudioData;

/// Progress report from a pipeline run, tagged with the run that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunEvent {
    pub run_id: u64,
    pub kind: RunEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEventKind {
    Transcript {
        text: String,
        is_final: bool,
    },
    /// A completed turn to append to the session history
    Turn(Turn),
    ResponseChunk(String),
    /// Full reply text of the final model turn
    Response(String),
    ToolCall(ToolCall),
    ToolResult {
        tool: String,
        result: String,
        display: Option<Value>,
    },
    Audio(AudioData),
    Finished {
        audio_chunks: u64,
    },
    Failed {
        message: String,
    },
    Cancelled,
}

impl RunEventKind {
    /// Whether this is the last event a run sends.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEventKind::Finished { .. } | RunEventKind::Failed { .. } | RunEventKind::Cancelled
        )
    }
}
