//! Client half of the voice protocol: ordered playback, a reconnecting
//! connection, and the glue between them.

pub mod connection;
pub mod playback;
pub mod voice_client;

pub use connection::{
    BackoffPolicy, ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager,
    ReconnectBackoff,
};
pub use playback::{AudioSink, PlaybackError, PlaybackEvent, PlaybackQueue};
pub use voice_client::{VoiceClient, VoiceClientEvent};
