//! Inputs to and outputs from a session actor.

use serde_json::Value;
use tokio::sync::oneshot;

use super::history::Turn;
use super::settings::{SessionSettings, SettingsUpdate};
use super::state_machine::SessionState;
use crate::core::audio::AudioFrame;
use crate::core::pipeline::RunEvent;
use crate::core::tts::AudioData;

/// Control commands from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    StartListening,
    StopListening,
    UpdateSettings(SettingsUpdate),
    Interrupt,
    /// The client's playback queue drained. `seq` is the last chunk played,
    /// when the client reports it.
    PlaybackDone { seq: Option<u64> },
    ClearConversation,
    TextMessage(String),
}

/// Everything the session reports to its client, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    State(SessionState),
    Transcript {
        text: String,
        is_final: bool,
    },
    ResponseChunk(String),
    Response(String),
    ToolCall {
        tool: String,
        arguments: Value,
    },
    ToolResult {
        tool: String,
        result: String,
        display: Option<Value>,
    },
    Audio {
        seq: u64,
        audio: AudioData,
    },
    Error(String),
    SettingsUpdated(SessionSettings),
}

/// Point-in-time view of a session for diagnostics and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: String,
    pub state: SessionState,
    pub history: Vec<Turn>,
    pub lock_held: bool,
    pub listening_enabled: bool,
    /// Last chunk of the current reply the client reported played
    pub drained_seq: Option<u64>,
}

/// Items on the actor's single inbox.
#[derive(Debug)]
pub enum SessionInput {
    Frame(AudioFrame),
    Command(SessionCommand),
    Run(RunEvent),
    Inspect(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

impl From<RunEvent> for SessionInput {
    fn from(event: RunEvent) -> Self {
        SessionInput::Run(event)
    }
}

impl From<SessionCommand> for SessionInput {
    fn from(command: SessionCommand) -> Self {
        SessionInput::Command(command)
    }
}

impl From<AudioFrame> for SessionInput {
    fn from(frame: AudioFrame) -> Self {
        SessionInput::Frame(frame)
    }
}
