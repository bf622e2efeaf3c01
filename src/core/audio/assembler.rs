//! Re-chunks arbitrarily sized capture frames into fixed-size VAD frames.
//!
//! Clients send whatever buffer size their audio stack produces; the VAD
//! engine wants a fixed cadence (512 samples = 32 ms at 16 kHz).

/// Default VAD frame size at 16 kHz.
pub const DEFAULT_VAD_FRAME_SAMPLES: usize = 512;

pub struct FrameAssembler {
    frame_samples: usize,
    pending: Vec<i16>,
}

impl FrameAssembler {
    pub fn new(frame_samples: usize) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples * 2),
        }
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Append samples and return every complete frame now available.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Vec<i16>> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.frame_samples;
        if complete == 0 {
            return Vec::new();
        }

        let mut frames = Vec::with_capacity(complete);
        let mut rest = self.pending.split_off(complete * self.frame_samples);
        std::mem::swap(&mut rest, &mut self.pending);
        // `rest` now holds the complete frames
        for chunk in rest.chunks_exact(self.frame_samples) {
            frames.push(chunk.to_vec());
        }
        frames
    }

    /// Samples waiting for the next complete frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_VAD_FRAME_SAMPLES)
    }
}
