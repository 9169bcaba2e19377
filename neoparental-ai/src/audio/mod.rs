//! Audio intake: clip validation and decoding to a 16 kHz mono waveform

pub mod clip;
pub mod decoder;

pub use clip::{AudioClip, ALLOWED_EXTENSIONS};
pub use decoder::{AudioDecoder, Waveform, TARGET_SAMPLE_RATE};
