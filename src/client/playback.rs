//! Sequenced playback of reply audio.
//!
//! Chunks are played one at a time, in the order they were enqueued, by a
//! worker task. Sequence numbers must increase between stops; a chunk that
//! repeats or goes back is rejected. `stop()` cancels the chunk being played
//! and clears everything queued in one step under the queue lock, so no
//! queued chunk can start after a stop returns.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::tts::AudioData;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Audio sink error: {0}")]
    Sink(String),
    #[error("Playback queue closed")]
    Closed,
    #[error("Chunk {seq} arrived after chunk {last}")]
    OutOfOrder { seq: u64, last: u64 },
}

/// Audio output device.
#[async_trait]
pub trait AudioSink: Send + Sync + 'static {
    /// Play one chunk to completion. Must return promptly once `cancel` fires.
    async fn play(&self, chunk: &AudioData, cancel: &CancellationToken) -> Result<(), PlaybackError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { seq: u64 },
    Finished { seq: u64 },
    /// The queue ran empty after `last_seq` finished or was stopped
    Drained { last_seq: u64 },
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<(u64, AudioData)>,
    active: Option<(u64, CancellationToken)>,
    /// Highest seq accepted since the last stop
    last_enqueued: Option<u64>,
    closed: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    notify: Notify,
    sink: Arc<dyn AudioSink>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

pub struct PlaybackQueue {
    inner: Arc<Inner>,
    worker: JoinHandle<()>,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn AudioSink>) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            sink,
            events,
        });
        let worker = tokio::spawn(run_worker(Arc::clone(&inner)));
        (Self { inner, worker }, events_rx)
    }

    pub fn enqueue(&self, seq: u64, chunk: AudioData) -> Result<(), PlaybackError> {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(PlaybackError::Closed);
            }
            if let Some(last) = state.last_enqueued.filter(|last| seq <= *last) {
                return Err(PlaybackError::OutOfOrder { seq, last });
            }
            state.last_enqueued = Some(seq);
            state.pending.push_back((seq, chunk));
        }
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Cancel the active chunk and drop everything queued. Emits `Drained`
    /// once if anything was playing or queued; otherwise a no-op. The next
    /// enqueue may start a fresh sequence.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.last_enqueued = None;
        let last_queued = state.pending.back().map(|(seq, _)| *seq);
        let dropped = state.pending.len();
        state.pending.clear();

        let last_seq = match state.active.take() {
            Some((seq, token)) => {
                token.cancel();
                debug!("Playback stopped at chunk {} ({} queued dropped)", seq, dropped);
                Some(seq)
            }
            None => last_queued,
        };
        if let Some(last_seq) = last_seq {
            let _ = self.inner.events.send(PlaybackEvent::Drained { last_seq });
        }
    }

    /// Whether a chunk is playing or waiting to play.
    pub fn is_playing(&self) -> bool {
        let state = self.inner.state.lock();
        state.active.is_some() || !state.pending.is_empty()
    }

    pub fn queued(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Stop playback and end the worker.
    pub fn close(&self) {
        self.stop();
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_one();
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        self.close();
        self.worker.abort();
    }
}

async fn run_worker(inner: Arc<Inner>) {
    loop {
        let next = {
            let mut state = inner.state.lock();
            if state.closed {
                return;
            }
            match state.pending.pop_front() {
                Some((seq, chunk)) => {
                    let token = CancellationToken::new();
                    state.active = Some((seq, token.clone()));
                    Some((seq, chunk, token))
                }
                None => None,
            }
        };

        let Some((seq, chunk, token)) = next else {
            inner.notify.notified().await;
            continue;
        };

        let _ = inner.events.send(PlaybackEvent::Started { seq });
        let result = inner.sink.play(&chunk, &token).await;

        let drained = {
            let mut state = inner.state.lock();
            if token.is_cancelled() {
                // stop() already cleared `active`
                continue;
            }
            state.active = None;
            state.pending.is_empty()
        };

        if let Err(e) = result {
            warn!("Playback of chunk {} failed: {}", seq, e);
        }
        let _ = inner.events.send(PlaybackEvent::Finished { seq });
        if drained {
            let _ = inner.events.send(PlaybackEvent::Drained { last_seq: seq });
        }
    }
}
