//! WebSocket message types and routing
//!
//! Text frames carry JSON objects tagged by `"type"`. Binary frames carry
//! audio using the one-byte-flag frame codec in [`crate::core::audio`].

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::session::{
    SessionCommand, SessionOutput, SessionSettings, SessionState, SettingsUpdate,
};
use crate::core::tts::AudioData;

/// Messages sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    StartListening,
    StopListening,
    /// Partial settings update; absent fields keep their value
    Settings(SettingsUpdate),
    Interrupt,
    PlaybackDone {
        /// Last audio chunk the client finished playing
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    ClearConversation,
    TextMessage {
        text: String,
    },
}

impl From<IncomingMessage> for SessionCommand {
    fn from(message: IncomingMessage) -> Self {
        match message {
            IncomingMessage::StartListening => SessionCommand::StartListening,
            IncomingMessage::StopListening => SessionCommand::StopListening,
            IncomingMessage::Settings(update) => SessionCommand::UpdateSettings(update),
            IncomingMessage::Interrupt => SessionCommand::Interrupt,
            IncomingMessage::PlaybackDone { seq } => SessionCommand::PlaybackDone { seq },
            IncomingMessage::ClearConversation => SessionCommand::ClearConversation,
            IncomingMessage::TextMessage { text } => SessionCommand::TextMessage(text),
        }
    }
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    State {
        value: SessionState,
    },
    Transcript {
        text: String,
        is_final: bool,
    },
    ResponseChunk {
        text: String,
    },
    Response {
        text: String,
    },
    ToolCall {
        tool: String,
        arguments: Value,
    },
    ToolResult {
        tool: String,
        result: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display: Option<Value>,
    },
    Audio {
        /// Base64-encoded audio bytes
        data: String,
        seq: u64,
        sample_rate: u32,
        format: String,
    },
    Error {
        message: String,
    },
    SettingsUpdated {
        settings: SessionSettings,
    },
}

impl OutgoingMessage {
    pub fn audio(seq: u64, audio: &AudioData) -> Self {
        OutgoingMessage::Audio {
            data: base64::engine::general_purpose::STANDARD.encode(&audio.data),
            seq,
            sample_rate: audio.sample_rate,
            format: audio.format.clone(),
        }
    }

    /// Decode the payload of an `audio` message.
    pub fn decode_audio(&self) -> Option<Result<(u64, AudioData), base64::DecodeError>> {
        match self {
            OutgoingMessage::Audio {
                data,
                seq,
                sample_rate,
                format,
            } => Some(
                base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map(|bytes| {
                        let mut audio = AudioData::pcm16(bytes, *sample_rate);
                        audio.format = format.clone();
                        (*seq, audio)
                    }),
            ),
            _ => None,
        }
    }
}

impl From<SessionOutput> for OutgoingMessage {
    fn from(output: SessionOutput) -> Self {
        match output {
            SessionOutput::State(value) => OutgoingMessage::State { value },
            SessionOutput::Transcript { text, is_final } => {
                OutgoingMessage::Transcript { text, is_final }
            }
            SessionOutput::ResponseChunk(text) => OutgoingMessage::ResponseChunk { text },
            SessionOutput::Response(text) => OutgoingMessage::Response { text },
            SessionOutput::ToolCall { tool, arguments } => {
                OutgoingMessage::ToolCall { tool, arguments }
            }
            SessionOutput::ToolResult {
                tool,
                result,
                display,
            } => OutgoingMessage::ToolResult {
                tool,
                result,
                display,
            },
            SessionOutput::Audio { seq, audio } => OutgoingMessage::audio(seq, &audio),
            SessionOutput::Error(message) => OutgoingMessage::Error { message },
            SessionOutput::SettingsUpdated(settings) => {
                OutgoingMessage::SettingsUpdated { settings }
            }
        }
    }
}
