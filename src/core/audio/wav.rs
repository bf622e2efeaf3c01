//! Minimal WAV container helpers for engines that expect files rather than raw PCM.

/// Size of the canonical PCM WAV header.
pub const WAV_HEADER_SIZE: usize = 44;

/// Wrap PCM16 samples in a canonical 44-byte RIFF/WAVE header.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;
    let data_len = (samples.len() * 2) as u32;

    let mut out = Vec::with_capacity(WAV_HEADER_SIZE + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Strip a RIFF header if present, returning the raw PCM payload.
pub fn strip_wav_header(audio: &[u8]) -> &[u8] {
    if audio.len() > WAV_HEADER_SIZE && &audio[0..4] == b"RIFF" && &audio[8..12] == b"WAVE" {
        &audio[WAV_HEADER_SIZE..]
    } else {
        audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wav_header_fields() {
        let wav = encode_wav(&[1, 2, 3], 16_000, 1);
        assert_eq!(wav.len(), WAV_HEADER_SIZE + 6);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16_000);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 6);
    }

    #[test]
    fn test_strip_wav_header() {
        let wav = encode_wav(&[0x0201], 24_000, 1);
        assert_eq!(strip_wav_header(&wav), &[0x01, 0x02]);

        let raw = [9u8; 8];
        assert_eq!(strip_wav_header(&raw), &raw);
    }
}
