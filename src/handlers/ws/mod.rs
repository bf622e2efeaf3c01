//! # WebSocket Voice Handler Module
//!
//! Real-time voice conversation over a single WebSocket per client.
//!
//! ## WebSocket API
//!
//! ### Connection Flow
//! 1. Client connects to `/ws`; a session starts in `idle` with the server's
//!    default settings
//! 2. Client optionally sends `settings` and then `start_listening`
//! 3. Client streams microphone audio as binary frames
//! 4. Server reports every state change, the transcript, the reply text and
//!    the reply audio
//! 5. Client sends `playback_done` once its playback queue drains
//!
//! ### Binary Frames
//!
//! `[flag: u8][PCM16LE mono 16 kHz samples]`. Flag `0` is ordinary capture,
//! flag `1` is capture while the client is playing reply audio. Flag-1 frames
//! are always analysed, so speech over the reply interrupts it.
//!
//! ### Message Types
//!
//! **Incoming Messages:**
//! - `{"type": "start_listening"}` / `{"type": "stop_listening"}`
//! - `{"type": "settings", "voice": "nova", "model": "gpt-4o-mini", ...}` - partial update
//! - `{"type": "interrupt"}` - explicit barge-in
//! - `{"type": "playback_done", "seq": 12}` - playback queue drained (`seq` optional)
//! - `{"type": "clear_conversation"}`
//! - `{"type": "text_message", "text": "..."}` - typed turn, skips STT
//!
//! **Outgoing Messages:**
//! - `{"type": "state", "value": "listening"}` - one per state entered, including `interrupted`
//! - `{"type": "transcript", "text": "...", "is_final": true}`
//! - `{"type": "response_chunk", "text": "..."}` / `{"type": "response", "text": "..."}`
//! - `{"type": "tool_call", "tool": "...", "arguments": {...}}`
//! - `{"type": "tool_result", "tool": "...", "result": "...", "display": {...}}`
//! - `{"type": "audio", "data": "<base64>", "seq": 0, "sample_rate": 24000, "format": "pcm16"}`
//! - `{"type": "settings_updated", "settings": {...}}`
//! - `{"type": "error", "message": "..."}`
//!
//! ## Error Handling
//!
//! Unparseable text messages and malformed binary frames are logged and
//! dropped; the connection stays open. Pipeline failures are reported as
//! `error` messages and the session returns to `idle`.

pub mod error;
pub mod handler;
pub mod messages;


// Re-export commonly used items
pub use error::{WebSocketError, WebSocketResult};
pub use handler::ws_voice_handler;
pub use messages::{IncomingMessage, OutgoingMessage};
