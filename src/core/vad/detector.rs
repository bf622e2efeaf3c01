//! VAD engine seam and the built-in RMS energy detector.

use super::config::EnergyVADConfig;

/// Per-frame speech/silence classifier.
///
/// Implementations may keep internal state between frames; each session owns
/// its own instance, so `&mut self` is fine.
pub trait VoiceActivityDetector: Send + Sync {
    /// Classify one fixed-size frame of PCM16 mono audio.
    fn classify(&mut self, frame: &[i16]) -> bool;

    /// Drop any internal state. Called when a session resets its gate.
    fn reset(&mut self) {}
}

/// Factory producing one detector per session.
pub type VADFactory = std::sync::Arc<dyn Fn() -> Box<dyn VoiceActivityDetector> + Send + Sync>;

/// Classifies frames by normalized RMS energy.
#[derive(Debug, Clone)]
pub struct EnergyVAD {
    config: EnergyVADConfig,
}

impl EnergyVAD {
    pub fn new(config: EnergyVADConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> f32 {
        self.config.threshold
    }
}

impl Default for EnergyVAD {
    fn default() -> Self {
        Self::new(EnergyVADConfig::default())
    }
}

impl VoiceActivityDetector for EnergyVAD {
    fn classify(&mut self, frame: &[i16]) -> bool {
        frame_rms(frame) > self.config.threshold
    }
}

/// Root-mean-square of a frame, normalized to 0.0..=1.0.
pub fn frame_rms(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame
        .iter()
        .map(|s| {
            let v = *s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    (sum / frame.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_shareable<T: Send + Sync + ?Sized>() {}

    #[test]
    fn test_boxed_detector_can_live_in_spawned_tasks() {
        // Session actors hold a boxed detector across awaits
        assert_shareable::<Box<dyn VoiceActivityDetector>>();
        let factory: VADFactory = std::sync::Arc::new(|| {
            Box::new(EnergyVAD::default()) as Box<dyn VoiceActivityDetector>
        });
        let vad = factory();
        std::thread::spawn(move || drop(vad)).join().unwrap();
    }

    #[test]
    fn test_frame_rms() {
        assert_eq!(frame_rms(&[]), 0.0);
        assert_eq!(frame_rms(&[0; 512]), 0.0);
        let loud = frame_rms(&[i16::MAX; 512]);
        assert!((loud - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_energy_vad_classifies_by_threshold() {
        let mut vad = EnergyVAD::default();
        assert!(!vad.classify(&[0; 512]));
        assert!(!vad.classify(&[100; 512]));
        assert!(vad.classify(&[8000; 512]));
    }
}
