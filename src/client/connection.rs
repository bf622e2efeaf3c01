//! Client side of the voice WebSocket with automatic reconnection.
//!
//! A driver task owns the socket. Audio goes out through a small bounded
//! channel with `try_send`, so a slow link drops frames instead of building
//! latency; control messages are awaited and survive a reconnect. Audio queued
//! while offline is discarded on reconnect, and the last settings are re-sent
//! before anything else.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::audio::{self, FrameFlag};
use crate::core::session::SettingsUpdate;
use crate::handlers::ws::{IncomingMessage, OutgoingMessage};

const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,
}

/// Exponential reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            factor: 2,
            max_delay: Duration::from_secs(10),
            max_attempts: 8,
        }
    }
}

/// Attempt counter over a [`BackoffPolicy`]. Reset it after a successful
/// connection.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: BackoffPolicy,
    attempts: u32,
}

impl ReconnectBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let multiplier = self.policy.factor.saturating_pow(self.attempts);
        let delay = self
            .policy
            .base_delay
            .saturating_mul(multiplier)
            .min(self.policy.max_delay);
        self.attempts += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Message(OutgoingMessage),
    Disconnected { code: Option<u16>, deliberate: bool },
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect attempts exhausted
    GaveUp,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub backoff: BackoffPolicy,
    /// Outbound audio frames buffered before frames are dropped
    pub audio_buffer: usize,
    pub control_buffer: usize,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: BackoffPolicy::default(),
            audio_buffer: 32,
            control_buffer: 64,
        }
    }
}

/// Cloneable handle to the connection driver task.
#[derive(Clone)]
pub struct ConnectionManager {
    audio_tx: mpsc::Sender<Bytes>,
    control_tx: mpsc::Sender<IncomingMessage>,
    settings: Arc<Mutex<Option<SettingsUpdate>>>,
    online: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn start(config: ConnectionConfig) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (audio_tx, audio_rx) = mpsc::channel(config.audio_buffer.max(1));
        let (control_tx, control_rx) = mpsc::channel(config.control_buffer.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let manager = Self {
            audio_tx,
            control_tx,
            settings: Arc::new(Mutex::new(None)),
            online: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        };

        let driver = Driver {
            config,
            audio_rx,
            control_rx,
            settings: Arc::clone(&manager.settings),
            online: Arc::clone(&manager.online),
            events: events_tx,
            shutdown: manager.shutdown.clone(),
        };
        tokio::spawn(driver.run());

        (manager, events_rx)
    }

    pub fn is_connected(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Queue one captured frame. Returns `false` when it was dropped because
    /// the link is down or backed up.
    pub fn send_audio(&self, flag: FrameFlag, samples: &[i16]) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.audio_tx.try_send(audio::encode(flag, samples)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Outbound audio buffer full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Send a control message, waiting for buffer space. Delivered after a
    /// reconnect if the link is currently down.
    pub async fn send_control(&self, message: IncomingMessage) -> Result<(), ConnectionError> {
        if let IncomingMessage::Settings(update) = &message {
            let mut settings = self.settings.lock();
            let merged = settings.get_or_insert_with(SettingsUpdate::default);
            merge_update(merged, update.clone());
        }
        self.control_tx
            .send(message)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    /// Close the connection deliberately; no reconnect follows.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

fn merge_update(into: &mut SettingsUpdate, update: SettingsUpdate) {
    macro_rules! take {
        ($($field:ident),*) => {
            $(if update.$field.is_some() { into.$field = update.$field; })*
        };
    }
    take!(backend, model, stt_model, tts_model, voice, system_prompt, language);
}

/// How one connection ended.
struct Closed {
    code: Option<u16>,
    deliberate: bool,
}

struct Driver {
    config: ConnectionConfig,
    audio_rx: mpsc::Receiver<Bytes>,
    control_rx: mpsc::Receiver<IncomingMessage>,
    settings: Arc<Mutex<Option<SettingsUpdate>>>,
    online: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let mut backoff = ReconnectBackoff::new(self.config.backoff);
        let mut reconnect = false;

        loop {
            let connected = tokio::select! {
                result = connect_async(self.config.url.as_str()) => result,
                _ = self.shutdown.cancelled() => break,
            };

            match connected {
                Ok((ws, _)) => {
                    info!("Connected to {}", self.config.url);
                    backoff.reset();

                    // Frames captured while offline are stale
                    while self.audio_rx.try_recv().is_ok() {}

                    self.online.store(true, Ordering::Release);
                    let _ = self.events.send(ConnectionEvent::Connected);
                    let closed = self.drive(ws, reconnect).await;
                    reconnect = true;
                    self.online.store(false, Ordering::Release);

                    let _ = self.events.send(ConnectionEvent::Disconnected {
                        code: closed.code,
                        deliberate: closed.deliberate,
                    });
                    if closed.deliberate {
                        info!("Connection closed normally");
                        break;
                    }
                    warn!("Connection lost (code {:?})", closed.code);
                }
                Err(e) => warn!("Failed to connect to {}: {}", self.config.url, e),
            }

            let Some(delay) = backoff.next_delay() else {
                warn!("Giving up after {} reconnect attempts", backoff.attempts());
                let _ = self.events.send(ConnectionEvent::GaveUp);
                break;
            };
            let _ = self.events.send(ConnectionEvent::Reconnecting {
                attempt: backoff.attempts(),
                delay,
            });
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        self.online.store(false, Ordering::Release);
    }

    /// Pump one open connection. After a reconnect the merged settings are
    /// replayed first; the first connection only sends what was queued.
    async fn drive<S>(&mut self, ws: S, reconnect: bool) -> Closed
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut sink, mut stream) = ws.split();
        let abnormal = Closed {
            code: None,
            deliberate: false,
        };

        let resend = if reconnect {
            self.settings.lock().clone()
        } else {
            None
        };
        if let Some(update) = resend {
            match serde_json::to_string(&IncomingMessage::Settings(update)) {
                Ok(json) => {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        return abnormal;
                    }
                }
                Err(e) => warn!("Failed to encode settings: {}", e),
            }
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return close_normally(&mut sink).await;
                }
                frame = self.audio_rx.recv() => match frame {
                    Some(frame) => {
                        if sink.send(Message::Binary(frame)).await.is_err() {
                            return abnormal;
                        }
                    }
                    None => return close_normally(&mut sink).await,
                },
                message = self.control_rx.recv() => match message {
                    Some(message) => {
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!("Failed to encode control message: {}", e);
                                continue;
                            }
                        };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            return abnormal;
                        }
                    }
                    None => return close_normally(&mut sink).await,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<OutgoingMessage>(&text) {
                            Ok(message) => {
                                let _ = self.events.send(ConnectionEvent::Message(message));
                            }
                            Err(e) => warn!("Ignoring unparseable server message: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        return Closed {
                            code,
                            deliberate: code == Some(NORMAL_CLOSURE),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket read error: {}", e);
                        return abnormal;
                    }
                    None => return abnormal,
                },
            }
        }
    }
}

async fn close_normally<K>(sink: &mut K) -> Closed
where
    K: Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client closed".into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
    Closed {
        code: Some(NORMAL_CLOSURE),
        deliberate: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let mut backoff = ReconnectBackoff::new(BackoffPolicy::default());
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![500, 1000, 2000, 4000, 8000, 10_000, 10_000, 10_000]
        );
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = ReconnectBackoff::new(BackoffPolicy::default());
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_backoff_large_attempts_saturate() {
        let mut backoff = ReconnectBackoff::new(BackoffPolicy {
            max_attempts: 100,
            ..Default::default()
        });
        let last = std::iter::from_fn(|| backoff.next_delay()).last();
        assert_eq!(last, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_merge_settings_update() {
        let mut stored = SettingsUpdate {
            voice: Some("alloy".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            ..Default::default()
        };
        merge_update(
            &mut stored,
            SettingsUpdate {
                voice: Some("nova".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(stored.voice.as_deref(), Some("nova"));
        assert_eq!(stored.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_audio_dropped_while_offline() {
        let (manager, mut events) = ConnectionManager::start(ConnectionConfig {
            backoff: BackoffPolicy {
                max_attempts: 0,
                ..Default::default()
            },
            ..ConnectionConfig::new("ws://127.0.0.1:1/ws")
        });

        assert!(!manager.send_audio(FrameFlag::Capture, &[0; 512]));
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(ConnectionEvent::GaveUp));
    }
}
