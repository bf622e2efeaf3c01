//! WebSocket error types
//!
//! Errors raised while handling a single inbound WebSocket message. None of
//! them close the connection; they are logged and the message is dropped.

use thiserror::Error;

use crate::core::audio::FrameError;

#[derive(Debug, Error)]
pub enum WebSocketError {
    /// A binary frame that does not follow the audio frame codec
    #[error("Invalid audio frame: {0}")]
    InvalidFrame(#[from] FrameError),

    /// A text frame that is not a known JSON message
    #[error("Invalid message format: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    /// The session actor is gone
    #[error("Session closed")]
    SessionClosed,
}

pub type WebSocketResult<T> = Result<T, WebSocketError>;
