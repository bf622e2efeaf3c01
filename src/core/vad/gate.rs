//! Debounced speech-boundary detection on top of per-frame VAD output.
//!
//! # State Transitions
//!
//! ```text
//! [Silent] ─── speech frame (after >= 1 silence frame) ──► [InSpeech]   emits SpeechStarted
//!     ▲                                                         │
//!     │                                   silence run >= hangover window
//!     │                                                         │
//!     └──────── voiced span >= min ─── SpeechEnded(utterance) ◄─┤
//!     └──────── voiced span <  min ─── Discarded               ◄┘
//!
//! [InSpeech] ─── utterance length >= max ──► [Silent]  emits SpeechEnded (forced)
//! ```
//!
//! Silence frames inside an utterance shorter than the hangover window are
//! micro-pauses: they are kept in the utterance audio and reset on the next
//! speech frame. After a forced end the gate waits for a silence frame before
//! it can start a new utterance, so a speaker who keeps talking past the cap
//! does not immediately re-trigger.

use tracing::{debug, info};

use super::config::GateConfig;

/// A finished utterance ready for transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// PCM16 mono audio from the first speech frame to the last speech frame.
    pub samples: Vec<i16>,
    /// Duration of `samples` in milliseconds.
    pub voiced_ms: u64,
    /// True when the utterance was cut by the length cap or an explicit stop.
    pub forced: bool,
}

/// Events emitted by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// First speech frame after silence.
    SpeechStarted,
    /// Utterance finished and long enough to transcribe.
    SpeechEnded(Utterance),
    /// Utterance finished but shorter than the minimum; treated as noise.
    Discarded { voiced_ms: u64 },
}

/// Turns per-frame speech/silence classifications into utterance boundaries.
pub struct VoiceActivityGate {
    config: GateConfig,
    hangover_frames: u32,

    in_speech: bool,
    /// Whether a silence frame has been seen since the last utterance ended.
    /// Starts true: the beginning of the stream counts as silence.
    seen_silence: bool,
    silence_run: u32,

    buffer: Vec<i16>,
    /// Buffer length right after the most recent speech frame.
    last_speech_end: usize,
}

impl VoiceActivityGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            hangover_frames: config.hangover_frames(),
            config,
            in_speech: false,
            seen_silence: true,
            silence_run: 0,
            buffer: Vec::new(),
            last_speech_end: 0,
        }
    }

    /// Feed one classified frame.
    pub fn push(&mut self, frame: &[i16], is_speech: bool) -> Option<GateEvent> {
        if !self.in_speech {
            if !is_speech {
                self.seen_silence = true;
                return None;
            }
            if !self.seen_silence {
                return None;
            }

            self.in_speech = true;
            self.seen_silence = false;
            self.silence_run = 0;
            self.buffer.clear();
            self.buffer.extend_from_slice(frame);
            self.last_speech_end = self.buffer.len();
            debug!("Gate: speech started");
            return Some(GateEvent::SpeechStarted);
        }

        self.buffer.extend_from_slice(frame);
        if is_speech {
            self.silence_run = 0;
            self.last_speech_end = self.buffer.len();
        } else {
            self.silence_run += 1;
        }

        if self.silence_run >= self.hangover_frames {
            return Some(self.finish(false));
        }

        if self.elapsed_ms() >= self.config.max_utterance_ms {
            info!(
                "Gate: utterance reached {}ms cap, forcing end",
                self.config.max_utterance_ms
            );
            return Some(self.finish(true));
        }

        None
    }

    /// End the current utterance now, if one is in progress.
    pub fn force_end(&mut self) -> Option<GateEvent> {
        if self.in_speech {
            Some(self.finish(true))
        } else {
            None
        }
    }

    fn finish(&mut self, forced: bool) -> GateEvent {
        self.in_speech = false;
        // Hangover ends are always preceded by silence; forced ends only when
        // the last frames were silent.
        self.seen_silence = self.silence_run > 0;
        self.silence_run = 0;

        self.buffer.truncate(self.last_speech_end);
        let samples = std::mem::take(&mut self.buffer);
        self.last_speech_end = 0;

        let voiced_ms = self.samples_to_ms(samples.len());
        if voiced_ms < self.config.min_utterance_ms {
            debug!(
                "Gate: discarding {}ms utterance (min={}ms)",
                voiced_ms, self.config.min_utterance_ms
            );
            return GateEvent::Discarded { voiced_ms };
        }

        debug!("Gate: speech ended after {}ms (forced={})", voiced_ms, forced);
        GateEvent::SpeechEnded(Utterance {
            samples,
            voiced_ms,
            forced,
        })
    }

    /// Reset to the initial silent state, dropping any partial utterance.
    pub fn reset(&mut self) {
        self.in_speech = false;
        self.seen_silence = true;
        self.silence_run = 0;
        self.buffer.clear();
        self.last_speech_end = 0;
    }

    pub fn is_in_speech(&self) -> bool {
        self.in_speech
    }

    /// Length of the utterance captured so far.
    pub fn elapsed_ms(&self) -> u64 {
        self.samples_to_ms(self.buffer.len())
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn samples_to_ms(&self, samples: usize) -> u64 {
        samples as u64 * 1000 / self.config.sample_rate as u64
    }
}

impl Default for VoiceActivityGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: [i16; 512] = [1000; 512];
    const QUIET: [i16; 512] = [0; 512];

    fn feed(gate: &mut VoiceActivityGate, speech: bool, count: usize) -> Vec<GateEvent> {
        let frame: &[i16] = if speech { &FRAME } else { &QUIET };
        (0..count).filter_map(|_| gate.push(frame, speech)).collect()
    }

    #[test]
    fn test_silence_only_emits_nothing() {
        let mut gate = VoiceActivityGate::default();
        assert!(feed(&mut gate, false, 50).is_empty());
        assert!(!gate.is_in_speech());
    }

    #[test]
    fn test_speech_started_on_first_speech_frame() {
        let mut gate = VoiceActivityGate::default();
        feed(&mut gate, false, 3);
        assert_eq!(gate.push(&FRAME, true), Some(GateEvent::SpeechStarted));
        assert!(gate.is_in_speech());
        assert!(feed(&mut gate, true, 5).is_empty());
    }

    #[test]
    fn test_speech_ended_after_hangover() {
        let mut gate = VoiceActivityGate::default();
        assert_eq!(feed(&mut gate, true, 20), vec![GateEvent::SpeechStarted]);

        // 14 silent frames is still inside the 15-frame hangover window
        assert!(feed(&mut gate, false, 14).is_empty());
        let events = feed(&mut gate, false, 1);
        match events.as_slice() {
            [GateEvent::SpeechEnded(utterance)] => {
                assert_eq!(utterance.samples.len(), 20 * 512);
                assert_eq!(utterance.voiced_ms, 640);
                assert!(!utterance.forced);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        assert!(!gate.is_in_speech());
    }

    #[test]
    fn test_micro_pause_does_not_end_utterance() {
        let mut gate = VoiceActivityGate::default();
        feed(&mut gate, true, 10);
        assert!(feed(&mut gate, false, 10).is_empty());
        assert!(feed(&mut gate, true, 10).is_empty());
        assert!(gate.is_in_speech());

        let events = feed(&mut gate, false, 15);
        match events.as_slice() {
            [GateEvent::SpeechEnded(utterance)] => {
                // the micro-pause stays inside the utterance
                assert_eq!(utterance.samples.len(), 30 * 512);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_short_utterance_discarded() {
        let mut gate = VoiceActivityGate::default();
        feed(&mut gate, true, 10); // 320ms < 500ms
        let events = feed(&mut gate, false, 15);
        assert_eq!(events, vec![GateEvent::Discarded { voiced_ms: 320 }]);
    }

    #[test]
    fn test_max_utterance_forces_end_and_waits_for_silence() {
        let config = GateConfig::default().with_max_utterance_ms(1000);
        let mut gate = VoiceActivityGate::new(config);

        let events = feed(&mut gate, true, 40);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], GateEvent::SpeechStarted);
        match &events[1] {
            GateEvent::SpeechEnded(utterance) => assert!(utterance.forced),
            other => panic!("unexpected event: {other:?}"),
        }

        // Continued speech after the forced end does not restart until silence
        assert!(!gate.is_in_speech());
        assert_eq!(gate.push(&QUIET, false), None);
        assert_eq!(gate.push(&FRAME, true), Some(GateEvent::SpeechStarted));
    }

    #[test]
    fn test_force_end() {
        let mut gate = VoiceActivityGate::default();
        assert_eq!(gate.force_end(), None);

        feed(&mut gate, true, 20);
        match gate.force_end() {
            Some(GateEvent::SpeechEnded(utterance)) => assert!(utterance.forced),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_reset_drops_partial_utterance() {
        let mut gate = VoiceActivityGate::default();
        feed(&mut gate, true, 20);
        gate.reset();
        assert!(!gate.is_in_speech());
        assert_eq!(gate.elapsed_ms(), 0);
        assert_eq!(gate.push(&FRAME, true), Some(GateEvent::SpeechStarted));
    }
}
