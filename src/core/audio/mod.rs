//! Audio framing: the binary wire codec, VAD frame re-chunking and WAV helpers.

pub mod assembler;
pub mod frame;
pub mod wav;

pub use assembler::{DEFAULT_VAD_FRAME_SAMPLES, FrameAssembler};
pub use frame::{
    AudioFrame, CAPTURE_CHANNELS, CAPTURE_SAMPLE_RATE, FrameError, FrameFlag, decode, encode,
    pcm16_from_le_bytes, pcm16_to_le_bytes,
};
pub use wav::{encode_wav, strip_wav_header};
