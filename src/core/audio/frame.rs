//! Binary audio frame codec.
//!
//! Every binary WebSocket message carries exactly one frame:
//!
//! ```text
//! +--------+---------------------------------------+
//! | flag   | PCM16 little-endian mono samples      |
//! | 1 byte | 2 bytes per sample, any sample count  |
//! +--------+---------------------------------------+
//! ```
//!
//! Nothing else travels in-band. Inbound capture audio is fixed at 16 kHz mono
//! ([`CAPTURE_SAMPLE_RATE`]); outbound synthesized audio is sent through JSON
//! `audio` messages at the engine's native rate, so this codec never has to
//! describe a sample rate or channel layout.

use bytes::{BufMut, Bytes, BytesMut};

/// Sample rate of inbound capture frames, negotiated out of band.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Channel count of inbound capture frames.
pub const CAPTURE_CHANNELS: u16 = 1;

/// Size of the flag prefix in bytes.
pub const FLAG_LEN: usize = 1;

/// What the client was doing when it captured the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameFlag {
    /// Ordinary microphone capture.
    Capture,
    /// Captured while the client was playing synthesized audio. These frames
    /// keep flowing while the client is not listening so the server can
    /// detect barge-in.
    PlaybackActive,
}

impl FrameFlag {
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            FrameFlag::Capture => 0,
            FrameFlag::PlaybackActive => 1,
        }
    }

    #[inline]
    pub fn from_byte(byte: u8) -> Result<Self, FrameError> {
        match byte {
            0 => Ok(FrameFlag::Capture),
            1 => Ok(FrameFlag::PlaybackActive),
            other => Err(FrameError::UnknownFlag(other)),
        }
    }

    pub fn is_playback(self) -> bool {
        matches!(self, FrameFlag::PlaybackActive)
    }
}

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("Unknown frame flag: {0}")]
    UnknownFlag(u8),
}

/// One decoded inbound audio frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub flag: FrameFlag,
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(flag: FrameFlag, samples: Vec<i16>) -> Self {
        Self { flag, samples }
    }

    /// Duration of the frame at the capture sample rate.
    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as u64 * 1000) / CAPTURE_SAMPLE_RATE as u64
    }
}

/// Encode a flag and PCM16 samples into a wire frame.
pub fn encode(flag: FrameFlag, samples: &[i16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FLAG_LEN + samples.len() * 2);
    buf.put_u8(flag.as_byte());
    for sample in samples {
        buf.put_i16_le(*sample);
    }
    buf.freeze()
}

/// Decode a wire frame.
///
/// Fails on an empty input, on a flag byte other than 0 or 1, and on a payload
/// with a dangling half sample.
pub fn decode(bytes: &[u8]) -> Result<AudioFrame, FrameError> {
    let Some((&flag_byte, payload)) = bytes.split_first() else {
        return Err(FrameError::MalformedFrame(
            "frame is shorter than 1 byte".to_string(),
        ));
    };

    let flag = FrameFlag::from_byte(flag_byte)?;

    if payload.len() % 2 != 0 {
        return Err(FrameError::MalformedFrame(format!(
            "payload length {} is not a whole number of PCM16 samples",
            payload.len()
        )));
    }

    let samples = pcm16_from_le_bytes(payload);
    Ok(AudioFrame { flag, samples })
}

/// Convert little-endian PCM16 bytes into samples. A trailing odd byte is ignored.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Convert samples into little-endian PCM16 bytes.
pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_prepends_single_flag_byte() {
        let bytes = encode(FrameFlag::PlaybackActive, &[1, -2]);
        assert_eq!(bytes.as_ref(), &[1, 0x01, 0x00, 0xFE, 0xFF]);

        let bytes = encode(FrameFlag::Capture, &[]);
        assert_eq!(bytes.as_ref(), &[0]);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let samples = vec![0, 1, -1, i16::MAX, i16::MIN, 1234, -4321];
        for flag in [FrameFlag::Capture, FrameFlag::PlaybackActive] {
            let frame = decode(&encode(flag, &samples)).unwrap();
            assert_eq!(frame.flag, flag);
            assert_eq!(frame.samples, samples);
        }
    }

    #[test]
    fn test_decode_flag_only_frame() {
        let frame = decode(&[1]).unwrap();
        assert_eq!(frame.flag, FrameFlag::PlaybackActive);
        assert!(frame.samples.is_empty());
    }

    #[test]
    fn test_decode_empty_input_is_malformed() {
        assert!(matches!(decode(&[]), Err(FrameError::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_flag() {
        assert_eq!(decode(&[7, 0, 0]), Err(FrameError::UnknownFlag(7)));
    }

    #[test]
    fn test_decode_rejects_half_sample() {
        assert!(matches!(
            decode(&[0, 0x10, 0x00, 0x20]),
            Err(FrameError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(FrameFlag::Capture, vec![0; 16_000]);
        assert_eq!(frame.duration_ms(), 1000);
    }
}
