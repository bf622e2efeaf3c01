//! Voice activity detection.
//!
//! The VAD engine itself sits behind [`VoiceActivityDetector`]; the crate ships
//! an RMS energy detector. [`VoiceActivityGate`] turns the per-frame
//! classifications into debounced `SpeechStarted` / `SpeechEnded` events and
//! enforces the minimum and maximum utterance lengths.

pub mod config;
pub mod detector;
pub mod gate;

pub use config::{EnergyVADConfig, GateConfig};
pub use detector::{EnergyVAD, VADFactory, VoiceActivityDetector, frame_rms};
pub use gate::{GateEvent, Utterance, VoiceActivityGate};
