//! Configuration for voice-activity detection and utterance gating.

use serde::{Deserialize, Serialize};

use crate::core::audio::{CAPTURE_SAMPLE_RATE, DEFAULT_VAD_FRAME_SAMPLES};

/// Configuration for the [`VoiceActivityGate`](super::VoiceActivityGate).
///
/// All durations are expressed in milliseconds and converted to whole frames
/// using the frame size and sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Samples per VAD frame.
    ///
    /// Default: 512 (32 ms at 16 kHz).
    pub frame_samples: usize,

    /// Capture sample rate in Hz.
    pub sample_rate: u32,

    /// Hangover window: how long continuous silence must last after speech
    /// before `speechEnded` fires. Absorbs micro-pauses inside an utterance.
    ///
    /// Default: 480 ms (15 frames).
    pub hangover_ms: u64,

    /// Utterances with less voiced audio than this are discarded as noise.
    ///
    /// Default: 500 ms.
    pub min_utterance_ms: u64,

    /// Utterances are force-ended once they reach this length.
    ///
    /// Default: 30 s.
    pub max_utterance_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            frame_samples: DEFAULT_VAD_FRAME_SAMPLES,
            sample_rate: CAPTURE_SAMPLE_RATE,
            hangover_ms: 480,
            min_utterance_ms: 500,
            max_utterance_ms: 30_000,
        }
    }
}

impl GateConfig {
    /// Frame duration in milliseconds (fractional).
    pub fn frame_duration_ms(&self) -> f64 {
        self.frame_samples as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Hangover window in whole frames, at least one.
    pub fn hangover_frames(&self) -> u32 {
        ((self.hangover_ms as f64 / self.frame_duration_ms()).ceil() as u32).max(1)
    }

    pub fn with_hangover_ms(mut self, hangover_ms: u64) -> Self {
        self.hangover_ms = hangover_ms;
        self
    }

    pub fn with_min_utterance_ms(mut self, min_utterance_ms: u64) -> Self {
        self.min_utterance_ms = min_utterance_ms;
        self
    }

    pub fn with_max_utterance_ms(mut self, max_utterance_ms: u64) -> Self {
        self.max_utterance_ms = max_utterance_ms;
        self
    }
}

/// Configuration for the RMS energy detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyVADConfig {
    /// Normalized RMS (0.0 to 1.0) above which a frame counts as speech.
    ///
    /// Default: 0.02
    pub threshold: f32,
}

impl Default for EnergyVADConfig {
    fn default() -> Self {
        Self { threshold: 0.02 }
    }
}
