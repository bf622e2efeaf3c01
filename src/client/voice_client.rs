//! Client glue: connection events drive the playback queue, and playback
//! drain is reported back to the server.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::{ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager};
use super::playback::{AudioSink, PlaybackEvent, PlaybackQueue};
use crate::core::audio::FrameFlag;
use crate::core::session::{SessionState, SettingsUpdate};
use crate::handlers::ws::{IncomingMessage, OutgoingMessage};

/// What the application sees from a [`VoiceClient`]. Audio messages are
/// consumed by the playback queue and not forwarded.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceClientEvent {
    Connected,
    Disconnected { deliberate: bool },
    Reconnecting { attempt: u32 },
    GaveUp,
    Server(OutgoingMessage),
    Playback(PlaybackEvent),
}

pub struct VoiceClient {
    connection: ConnectionManager,
    playback: Arc<PlaybackQueue>,
    router: JoinHandle<()>,
}

impl VoiceClient {
    pub fn connect(
        config: ConnectionConfig,
        sink: Arc<dyn AudioSink>,
    ) -> (Self, mpsc::UnboundedReceiver<VoiceClientEvent>) {
        let (connection, connection_events) = ConnectionManager::start(config);
        let (playback, playback_events) = PlaybackQueue::new(sink);
        let playback = Arc::new(playback);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let router = tokio::spawn(route_events(
            connection.clone(),
            Arc::clone(&playback),
            connection_events,
            playback_events,
            events_tx,
        ));

        (
            Self {
                connection,
                playback,
                router,
            },
            events_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Send one microphone frame, flagged while reply audio is playing so the
    /// server keeps listening for barge-in.
    pub fn send_capture(&self, samples: &[i16]) -> bool {
        let flag = if self.playback.is_playing() {
            FrameFlag::PlaybackActive
        } else {
            FrameFlag::Capture
        };
        self.connection.send_audio(flag, samples)
    }

    pub async fn start_listening(&self) -> Result<(), ConnectionError> {
        self.connection
            .send_control(IncomingMessage::StartListening)
            .await
    }

    pub async fn stop_listening(&self) -> Result<(), ConnectionError> {
        self.connection
            .send_control(IncomingMessage::StopListening)
            .await
    }

    /// Stop local playback right away and ask the server to cancel the reply.
    pub async fn interrupt(&self) -> Result<(), ConnectionError> {
        self.playback.stop();
        self.connection.send_control(IncomingMessage::Interrupt).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        self.connection
            .send_control(IncomingMessage::TextMessage { text: text.into() })
            .await
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<(), ConnectionError> {
        self.connection
            .send_control(IncomingMessage::Settings(update))
            .await
    }

    pub async fn clear_conversation(&self) -> Result<(), ConnectionError> {
        self.playback.stop();
        self.connection
            .send_control(IncomingMessage::ClearConversation)
            .await
    }

    pub fn close(&self) {
        self.connection.close();
        self.playback.close();
    }
}

impl Drop for VoiceClient {
    fn drop(&mut self) {
        self.close();
        self.router.abort();
    }
}

async fn route_events(
    connection: ConnectionManager,
    playback: Arc<PlaybackQueue>,
    mut connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    mut playback_events: mpsc::UnboundedReceiver<PlaybackEvent>,
    events: mpsc::UnboundedSender<VoiceClientEvent>,
) {
    loop {
        tokio::select! {
            event = connection_events.recv() => {
                let Some(event) = event else { break };
                let forwarded = match event {
                    ConnectionEvent::Connected => Some(VoiceClientEvent::Connected),
                    ConnectionEvent::Message(message) => on_server_message(&playback, message),
                    ConnectionEvent::Disconnected { code, deliberate } => {
                        info!("Disconnected (code {:?}), stopping playback", code);
                        playback.stop();
                        Some(VoiceClientEvent::Disconnected { deliberate })
                    }
                    ConnectionEvent::Reconnecting { attempt, delay } => {
                        debug!("Reconnect attempt {} in {:?}", attempt, delay);
                        Some(VoiceClientEvent::Reconnecting { attempt })
                    }
                    ConnectionEvent::GaveUp => Some(VoiceClientEvent::GaveUp),
                };
                if let Some(event) = forwarded {
                    let _ = events.send(event);
                }
            }
            Some(event) = playback_events.recv() => {
                if let PlaybackEvent::Drained { last_seq } = event {
                    if connection.is_connected() {
                        let done = IncomingMessage::PlaybackDone { seq: Some(last_seq) };
                        if let Err(e) = connection.send_control(done).await {
                            debug!("Could not report playback drain: {}", e);
                        }
                    }
                }
                let _ = events.send(VoiceClientEvent::Playback(event));
            }
        }
    }
}

fn on_server_message(playback: &PlaybackQueue, message: OutgoingMessage) -> Option<VoiceClientEvent> {
    match message.decode_audio() {
        Some(Ok((seq, audio))) => {
            if let Err(e) = playback.enqueue(seq, audio) {
                debug!("Dropping audio chunk {}: {}", seq, e);
            }
            return None;
        }
        Some(Err(e)) => {
            warn!("Dropping undecodable audio chunk: {}", e);
            return None;
        }
        None => {}
    }

    if let OutgoingMessage::State {
        value: SessionState::Interrupted,
    } = message
    {
        playback.stop();
    }
    Some(VoiceClientEvent::Server(message))
}
