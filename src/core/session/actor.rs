//! Per-session sequencer.
//!
//! Every input for a session (decoded audio frames, client commands, pipeline
//! run events and inspection queries) arrives on one bounded inbox and is
//! handled to completion before the next one is read. State transitions are
//! therefore serialized without a lock; the only mutex in play is the
//! execution lock guarding pipeline runs.
//!
//! Pipeline runs execute on their own tasks and report back through the same
//! inbox. Each event carries its run id, and events from a run that is no
//! longer current are dropped. That is what keeps a cancelled reply from
//! reaching the history after a barge-in.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::messages::{SessionCommand, SessionInput, SessionOutput, SessionSnapshot};
use super::model::Session;
use super::settings::SessionSettings;
use super::state_machine::{SessionEvent, SessionState};
use crate::core::audio::{AudioFrame, FrameAssembler};
use crate::core::pipeline::{
    PipelineCoordinator, PipelineError, PipelineResult, RunEvent, RunEventKind, RunInput,
    RunRequest,
};
use crate::core::vad::{GateConfig, GateEvent, Utterance, VoiceActivityDetector, VoiceActivityGate};

const DEFAULT_INBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub gate: GateConfig,
    /// Initial engine selection; clients may update it per session
    pub settings: SessionSettings,
    pub inbox_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            settings: SessionSettings::default(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Session {0} is closed")]
pub struct SessionClosed(pub String);

/// Cheap handle for feeding a running session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    tx: mpsc::Sender<SessionInput>,
}

impl SessionHandle {
    /// Start a session actor. Outputs are delivered on `outbound` in order.
    pub fn spawn(
        config: SessionConfig,
        coordinator: PipelineCoordinator,
        vad: Box<dyn VoiceActivityDetector>,
        outbound: mpsc::Sender<SessionOutput>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));
        let session = Session::new(config.settings);
        let id = session.id.clone();

        let actor = SessionActor {
            session,
            inbox: rx,
            run_tx: tx.downgrade(),
            outbound,
            coordinator,
            vad,
            assembler: FrameAssembler::new(config.gate.frame_samples),
            gate: VoiceActivityGate::new(config.gate),
            max_utterance: Duration::from_millis(config.gate.max_utterance_ms),
            listening_enabled: true,
            current_run: None,
            next_audio_seq: 0,
            last_audio_seq: None,
            drained_seq: None,
            utterance_deadline: None,
        };
        let task = tokio::spawn(actor.run());

        (Self { id, tx }, task)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn send_frame(&self, frame: AudioFrame) -> Result<(), SessionClosed> {
        self.send(SessionInput::Frame(frame)).await
    }

    pub async fn send_command(&self, command: SessionCommand) -> Result<(), SessionClosed> {
        self.send(SessionInput::Command(command)).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionInput::Inspect(reply_tx)).await?;
        reply_rx.await.map_err(|_| SessionClosed(self.id.clone()))
    }

    /// Cancel any run and stop the actor.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionInput::Shutdown).await;
    }

    async fn send(&self, input: SessionInput) -> Result<(), SessionClosed> {
        self.tx
            .send(input)
            .await
            .map_err(|_| SessionClosed(self.id.clone()))
    }
}

enum Wake {
    Input(Option<SessionInput>),
    UtteranceDeadline,
}

struct SessionActor {
    session: Session,
    inbox: mpsc::Receiver<SessionInput>,
    /// Weak so the inbox closes once every handle and run is gone
    run_tx: mpsc::WeakSender<SessionInput>,
    outbound: mpsc::Sender<SessionOutput>,
    coordinator: PipelineCoordinator,

    vad: Box<dyn VoiceActivityDetector>,
    assembler: FrameAssembler,
    gate: VoiceActivityGate,
    max_utterance: Duration,
    /// Whether flag-0 capture frames are analysed
    listening_enabled: bool,

    current_run: Option<u64>,
    next_audio_seq: u64,
    last_audio_seq: Option<u64>,
    drained_seq: Option<u64>,
    utterance_deadline: Option<Instant>,
}

impl SessionActor {
    async fn run(mut self) {
        info!("Session {} started", self.session.id);

        loop {
            let deadline = self.utterance_deadline;
            let wake = tokio::select! {
                input = self.inbox.recv() => Wake::Input(input),
                _ = wait_until(deadline) => Wake::UtteranceDeadline,
            };

            let input = match wake {
                Wake::Input(Some(input)) => input,
                Wake::Input(None) => break,
                Wake::UtteranceDeadline => {
                    self.on_utterance_timeout().await;
                    continue;
                }
            };

            match input {
                SessionInput::Frame(frame) => {
                    self.session.touch();
                    self.on_frame(frame).await;
                }
                SessionInput::Command(command) => {
                    self.session.touch();
                    self.on_command(command).await;
                }
                SessionInput::Run(event) => self.on_run_event(event).await,
                SessionInput::Inspect(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                SessionInput::Shutdown => break,
            }
        }

        if let Some(run_id) = self.session.execution_lock.cancel_current() {
            debug!("Session {} cancelled run {} on close", self.session.id, run_id);
        }
        info!(
            "Session {} closed ({} turns)",
            self.session.id,
            self.session.history.len()
        );
    }

    fn state(&self) -> SessionState {
        self.session.current_state()
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.session.id.clone(),
            state: self.state(),
            history: self.session.history.snapshot(),
            lock_held: self.session.execution_lock.is_held(),
            listening_enabled: self.listening_enabled,
            drained_seq: self.drained_seq,
        }
    }

    async fn emit(&self, output: SessionOutput) {
        if self.outbound.send(output).await.is_err() {
            debug!("Session {} output channel closed", self.session.id);
        }
    }

    /// Apply a state machine event and report every state entered.
    async fn transition(&mut self, event: SessionEvent) -> bool {
        match self.session.state.apply(event) {
            Ok(entered) => {
                for state in entered {
                    self.emit(SessionOutput::State(state)).await;
                }
                true
            }
            Err(e) => {
                debug!("Session {}: {}", self.session.id, e);
                false
            }
        }
    }

    fn reset_capture(&mut self) {
        self.gate.reset();
        self.assembler.reset();
        self.vad.reset();
        self.utterance_deadline = None;
    }

    async fn on_frame(&mut self, frame: AudioFrame) {
        if !frame.flag.is_playback() && !self.listening_enabled {
            return;
        }
        if self.state() == SessionState::Processing {
            return;
        }

        for vad_frame in self.assembler.push(&frame.samples) {
            let is_speech = self.vad.classify(&vad_frame);
            if let Some(event) = self.gate.push(&vad_frame, is_speech) {
                self.on_gate_event(event).await;
                if self.state() == SessionState::Processing {
                    self.reset_capture();
                    break;
                }
            }
        }
    }

    async fn on_gate_event(&mut self, event: GateEvent) {
        match event {
            GateEvent::SpeechStarted => {
                match self.state() {
                    SessionState::Speaking => self.barge_in(SessionEvent::SpeechStarted).await,
                    SessionState::Idle => {
                        self.transition(SessionEvent::SpeechStarted).await;
                    }
                    _ => {}
                }
                self.utterance_deadline = Some(Instant::now() + self.max_utterance);
            }
            GateEvent::SpeechEnded(utterance) => {
                self.utterance_deadline = None;
                self.on_utterance(utterance).await;
            }
            GateEvent::Discarded { voiced_ms } => {
                self.utterance_deadline = None;
                debug!(
                    "Session {} discarded {}ms utterance as noise",
                    self.session.id, voiced_ms
                );
            }
        }
    }

    async fn on_utterance(&mut self, utterance: Utterance) {
        if self.state() != SessionState::Listening {
            debug!(
                "Session {} ignoring utterance in state {}",
                self.session.id,
                self.state()
            );
            return;
        }
        info!(
            "Session {} utterance of {}ms (forced={})",
            self.session.id, utterance.voiced_ms, utterance.forced
        );

        match self.start_run(RunInput::Utterance(utterance.samples)) {
            Ok(()) => {
                self.transition(SessionEvent::SpeechEnded).await;
                self.reset_capture();
            }
            Err(e) => self.emit(SessionOutput::Error(e.to_string())).await,
        }
    }

    async fn on_utterance_timeout(&mut self) {
        self.utterance_deadline = None;
        warn!(
            "Session {} utterance reached {}ms without ending, forcing end",
            self.session.id,
            self.max_utterance.as_millis()
        );
        self.assembler.reset();
        if let Some(GateEvent::SpeechEnded(utterance)) = self.gate.force_end() {
            self.on_utterance(utterance).await;
        }
    }

    /// Cancel the current run and move to `Listening` through `Interrupted`.
    async fn barge_in(&mut self, event: SessionEvent) {
        if let Some(run_id) = self.session.execution_lock.cancel_current() {
            info!("Session {} barge-in cancelled run {}", self.session.id, run_id);
        }
        self.current_run = None;
        self.transition(event).await;
        self.listening_enabled = true;
    }

    fn start_run(&mut self, input: RunInput) -> PipelineResult<()> {
        let tx = self.run_tx.upgrade().ok_or(PipelineError::Cancelled)?;
        let request = RunRequest {
            input,
            history: self.session.history.snapshot(),
            settings: self.session.settings.clone(),
        };
        let run_id = self
            .coordinator
            .spawn(&self.session.execution_lock, request, tx)?;
        self.current_run = Some(run_id);
        // Drain acks only count against the reply being produced
        self.last_audio_seq = None;
        self.drained_seq = None;
        Ok(())
    }

    async fn on_command(&mut self, command: SessionCommand) {
        debug!("Session {} command {:?}", self.session.id, command);
        match command {
            SessionCommand::StartListening => {
                self.listening_enabled = true;
                self.transition(SessionEvent::StartListening).await;
            }
            SessionCommand::StopListening => {
                self.listening_enabled = false;
                self.stop_listening().await;
            }
            SessionCommand::UpdateSettings(update) => {
                match self.session.settings.apply(update) {
                    Ok(()) => {
                        info!("Session {} settings updated", self.session.id);
                        self.emit(SessionOutput::SettingsUpdated(self.session.settings.clone()))
                            .await;
                    }
                    Err(e) => self.emit(SessionOutput::Error(e.to_string())).await,
                }
            }
            SessionCommand::Interrupt => match self.state() {
                SessionState::Speaking | SessionState::Processing => {
                    self.barge_in(SessionEvent::Interrupt).await
                }
                state => debug!(
                    "Session {} ignoring interrupt in state {}",
                    self.session.id, state
                ),
            },
            SessionCommand::PlaybackDone { seq } => {
                // Without a seq the ack covers the current reply's audio so far;
                // before its first chunk it can only be left over from an
                // earlier reply.
                match seq.or(self.last_audio_seq) {
                    Some(seq) => {
                        self.drained_seq = Some(self.drained_seq.map_or(seq, |d| d.max(seq)));
                    }
                    None => debug!(
                        "Session {} ignoring playback_done before any reply audio",
                        self.session.id
                    ),
                }
                self.finish_speaking_if_drained().await;
            }
            SessionCommand::ClearConversation => self.clear().await,
            SessionCommand::TextMessage(text) => self.on_text(text).await,
        }
    }

    async fn stop_listening(&mut self) {
        if self.state() != SessionState::Listening {
            return;
        }
        self.assembler.reset();
        self.utterance_deadline = None;
        match self.gate.force_end() {
            Some(GateEvent::SpeechEnded(utterance)) => self.on_utterance(utterance).await,
            _ => {
                self.transition(SessionEvent::StopListening).await;
            }
        }
    }

    async fn clear(&mut self) {
        if let Some(run_id) = self.session.execution_lock.cancel_current() {
            info!("Session {} clear cancelled run {}", self.session.id, run_id);
        }
        self.current_run = None;
        self.session.history.clear();
        self.reset_capture();
        self.transition(SessionEvent::Clear).await;
    }

    async fn on_text(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            debug!("Session {} ignoring empty text message", self.session.id);
            return;
        }

        match self.state() {
            SessionState::Processing => {
                warn!("Session {} rejected text while processing", self.session.id);
                self.emit(SessionOutput::Error(PipelineError::AlreadyRunning.to_string()))
                    .await;
                return;
            }
            SessionState::Speaking => {
                if let Some(run_id) = self.session.execution_lock.cancel_current() {
                    info!(
                        "Session {} text barge-in cancelled run {}",
                        self.session.id, run_id
                    );
                }
                self.current_run = None;
                self.listening_enabled = true;
            }
            _ => {}
        }

        match self.start_run(RunInput::Text(text)) {
            Ok(()) => {
                self.transition(SessionEvent::TextSubmitted).await;
                self.reset_capture();
            }
            Err(e) => self.emit(SessionOutput::Error(e.to_string())).await,
        }
    }

    fn playback_caught_up(&self) -> bool {
        match (self.last_audio_seq, self.drained_seq) {
            (None, _) => true,
            (Some(sent), Some(drained)) => drained >= sent,
            (Some(_), None) => false,
        }
    }

    async fn finish_speaking_if_drained(&mut self) {
        if self.state() == SessionState::Speaking
            && self.current_run.is_none()
            && self.playback_caught_up()
        {
            self.transition(SessionEvent::PlaybackDrained).await;
        }
    }

    async fn on_run_event(&mut self, event: RunEvent) {
        if self.current_run != Some(event.run_id) {
            debug!(
                "Session {} dropping event from stale run {}",
                self.session.id, event.run_id
            );
            return;
        }

        match event.kind {
            RunEventKind::Transcript { text, is_final } => {
                self.emit(SessionOutput::Transcript { text, is_final }).await
            }
            RunEventKind::Turn(turn) => self.session.history.append(turn),
            RunEventKind::ResponseChunk(text) => {
                self.emit(SessionOutput::ResponseChunk(text)).await
            }
            RunEventKind::Response(text) => self.emit(SessionOutput::Response(text)).await,
            RunEventKind::ToolCall(call) => {
                self.emit(SessionOutput::ToolCall {
                    tool: call.name,
                    arguments: call.arguments,
                })
                .await
            }
            RunEventKind::ToolResult {
                tool,
                result,
                display,
            } => {
                self.emit(SessionOutput::ToolResult {
                    tool,
                    result,
                    display,
                })
                .await
            }
            RunEventKind::Audio(audio) => {
                if self.state() == SessionState::Processing {
                    self.transition(SessionEvent::ReplyAudio).await;
                }
                let seq = self.next_audio_seq;
                self.next_audio_seq += 1;
                self.last_audio_seq = Some(seq);
                self.emit(SessionOutput::Audio { seq, audio }).await;
            }
            RunEventKind::Finished { audio_chunks } => {
                debug!(
                    "Session {} run {} finished with {} chunks",
                    self.session.id, event.run_id, audio_chunks
                );
                self.current_run = None;
                match self.state() {
                    SessionState::Processing => {
                        self.transition(SessionEvent::FinishedWithoutAudio).await;
                    }
                    SessionState::Speaking => self.finish_speaking_if_drained().await,
                    _ => {}
                }
            }
            RunEventKind::Failed { message } => {
                self.current_run = None;
                self.emit(SessionOutput::Error(message)).await;
                self.transition(SessionEvent::PipelineFailed).await;
            }
            RunEventKind::Cancelled => {
                self.current_run = None;
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
