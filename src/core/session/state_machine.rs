//! Conversational state of one session.
//!
//! ```text
//!            speech / start             speech ended              reply audio
//!   [Idle] ─────────────────► [Listening] ─────────► [Processing] ─────────► [Speaking]
//!     ▲  ◄──── stop ────────────────┘                  │    │                  │  │
//!     │                                                │    │ error / no audio │  │ drained / error
//!     ├────────────────────────────────────────────────┘    ▼                  │  │
//!     ◄──────────────────────────────────────────────────────────────────────────┘ │
//!                                                                                 │ barge-in
//!                               [Listening] ◄── (same tick) ── [Interrupted] ◄────┘
//! ```
//!
//! `Interrupted` is transient: entering it always continues into `Listening`
//! within the same call, and both states are reported so clients can stop
//! playback on the `Interrupted` notification.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
    Interrupted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
            SessionState::Speaking => "speaking",
            SessionState::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs that may move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SpeechStarted,
    SpeechEnded,
    StartListening,
    StopListening,
    /// The running pipeline produced its first audio chunk
    ReplyAudio,
    /// The pipeline finished without producing audio
    FinishedWithoutAudio,
    PipelineFailed,
    PlaybackDrained,
    Interrupt,
    TextSubmitted,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No transition for {event:?} in state {from}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub event: SessionEvent,
}

#[derive(Debug, Default)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Apply an event and return every state entered, in order. An empty
    /// list means the event was accepted but left the state unchanged.
    pub fn apply(&mut self, event: SessionEvent) -> Result<Vec<SessionState>, InvalidTransition> {
        use SessionEvent as E;
        use SessionState as S;

        let path: &[SessionState] = match (self.state, event) {
            (S::Idle, E::SpeechStarted | E::StartListening) => &[S::Listening],
            (S::Listening, E::SpeechStarted | E::StartListening) => &[],
            (S::Listening, E::SpeechEnded) => &[S::Processing],
            (S::Listening, E::StopListening) => &[S::Idle],
            (S::Idle, E::StopListening) => &[],

            (S::Processing, E::ReplyAudio) => &[S::Speaking],
            (S::Speaking, E::ReplyAudio) => &[],
            (S::Processing, E::FinishedWithoutAudio | E::PipelineFailed) => &[S::Idle],
            (S::Speaking, E::PipelineFailed | E::PlaybackDrained) => &[S::Idle],

            (S::Speaking, E::SpeechStarted) => &[S::Interrupted, S::Listening],
            (S::Speaking | S::Processing, E::Interrupt) => &[S::Interrupted, S::Listening],

            (S::Idle | S::Listening, E::TextSubmitted) => &[S::Processing],
            (S::Speaking, E::TextSubmitted) => &[S::Interrupted, S::Listening, S::Processing],

            (S::Idle, E::Clear) => &[],
            (_, E::Clear) => &[S::Idle],

            (from, event) => return Err(InvalidTransition { from, event }),
        };

        if let Some(last) = path.last() {
            debug!("State {} -> {} on {:?}", self.state, last, event);
            self.state = *last;
        }
        Ok(path.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionEvent as E;
    use SessionState as S;

    fn machine_in(state: SessionState) -> SessionStateMachine {
        SessionStateMachine { state }
    }

    #[test]
    fn test_normal_turn() {
        let mut m = SessionStateMachine::new();
        assert_eq!(m.apply(E::SpeechStarted).unwrap(), vec![S::Listening]);
        assert_eq!(m.apply(E::SpeechEnded).unwrap(), vec![S::Processing]);
        assert_eq!(m.apply(E::ReplyAudio).unwrap(), vec![S::Speaking]);
        assert_eq!(m.apply(E::ReplyAudio).unwrap(), vec![]);
        assert_eq!(m.apply(E::PlaybackDrained).unwrap(), vec![S::Idle]);
        assert_eq!(m.state(), S::Idle);
    }

    #[test]
    fn test_barge_in_passes_through_interrupted() {
        let mut m = machine_in(S::Speaking);
        assert_eq!(
            m.apply(E::SpeechStarted).unwrap(),
            vec![S::Interrupted, S::Listening]
        );
        assert_eq!(m.state(), S::Listening);
    }

    #[test]
    fn test_explicit_interrupt_during_processing() {
        let mut m = machine_in(S::Processing);
        assert_eq!(
            m.apply(E::Interrupt).unwrap(),
            vec![S::Interrupted, S::Listening]
        );
    }

    #[test]
    fn test_errors_return_to_idle() {
        for state in [S::Processing, S::Speaking] {
            let mut m = machine_in(state);
            assert_eq!(m.apply(E::PipelineFailed).unwrap(), vec![S::Idle]);
        }
    }

    #[test]
    fn test_text_submission() {
        let mut m = machine_in(S::Speaking);
        assert_eq!(
            m.apply(E::TextSubmitted).unwrap(),
            vec![S::Interrupted, S::Listening, S::Processing]
        );

        let err = m.apply(E::TextSubmitted).unwrap_err();
        assert_eq!(err.from, S::Processing);
    }

    #[test]
    fn test_clear_from_any_state() {
        for state in [S::Listening, S::Processing, S::Speaking] {
            let mut m = machine_in(state);
            assert_eq!(m.apply(E::Clear).unwrap(), vec![S::Idle]);
        }
        assert_eq!(machine_in(S::Idle).apply(E::Clear).unwrap(), vec![]);
    }

    #[test]
    fn test_invalid_transitions_leave_state_unchanged() {
        let mut m = SessionStateMachine::new();
        assert!(m.apply(E::SpeechEnded).is_err());
        assert!(m.apply(E::PlaybackDrained).is_err());
        assert!(m.apply(E::Interrupt).is_err());
        assert_eq!(m.state(), S::Idle);

        let mut m = machine_in(S::Processing);
        assert!(m.apply(E::SpeechStarted).is_err());
        assert!(m.apply(E::PlaybackDrained).is_err());
        assert_eq!(m.state(), S::Processing);
    }

    #[test]
    fn test_stop_listening() {
        let mut m = machine_in(S::Listening);
        assert_eq!(m.apply(E::StopListening).unwrap(), vec![S::Idle]);
        assert_eq!(m.apply(E::StopListening).unwrap(), vec![]);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&S::Interrupted).unwrap(), "\"interrupted\"");
        assert_eq!(S::Speaking.to_string(), "speaking");
    }
}
