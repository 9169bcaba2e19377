//! Audio Decoding
//!
//! **Purpose:** Decode an uploaded clip to the mono 16 kHz waveform the
//! feature extractor expects.
//!
//! Uses symphonia for format-agnostic decoding (WAV, MP3, AAC/M4A, FLAC, OGG)
//! and rubato for sample rate conversion.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Cursor;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::debug;

use super::AudioClip;
use crate::error::ExtractionError;

/// Analysis sample rate shared with the training pipeline
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decoded mono samples at a known rate
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Mono samples (f32, nominal range [-1.0, 1.0])
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Clip decoder with fixed output rate and optional duration cap
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    target_sample_rate: u32,
    max_duration_secs: Option<f64>,
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self {
            target_sample_rate: TARGET_SAMPLE_RATE,
            max_duration_secs: None,
        }
    }
}

impl AudioDecoder {
    pub fn new(max_duration_secs: Option<f64>) -> Self {
        Self {
            target_sample_rate: TARGET_SAMPLE_RATE,
            max_duration_secs,
        }
    }

    /// Decode a clip to a mono waveform at 16 kHz
    ///
    /// **Algorithm:**
    /// 1. Probe the container, using the filename extension as a hint
    /// 2. Decode every packet of the first audio track
    /// 3. Average channels to mono
    /// 4. Resample to 16 kHz (sinc interpolation) if the native rate differs
    /// 5. Truncate to the configured maximum duration
    ///
    /// The clip is consumed; its bytes are dropped when decoding finishes.
    pub fn decode(&self, clip: AudioClip) -> Result<Waveform, ExtractionError> {
        let extension = clip.extension();
        let filename = clip.filename().to_string();
        let decoded = decode_bytes(clip.into_bytes(), extension.as_deref())?;

        if decoded.samples.is_empty() {
            return Err(ExtractionError::EmptyAudio);
        }

        let mut samples = if decoded.sample_rate != self.target_sample_rate {
            resample_mono(&decoded.samples, decoded.sample_rate, self.target_sample_rate)?
        } else {
            decoded.samples
        };

        if let Some(max_secs) = self.max_duration_secs {
            let max_samples = (max_secs * self.target_sample_rate as f64) as usize;
            if samples.len() > max_samples {
                samples.truncate(max_samples);
            }
        }

        if samples.is_empty() {
            return Err(ExtractionError::EmptyAudio);
        }

        let waveform = Waveform::new(samples, self.target_sample_rate);
        debug!(
            file = %filename,
            native_rate = decoded.sample_rate,
            channels = decoded.channels,
            samples = waveform.samples.len(),
            duration_seconds = format!("{:.2}", waveform.duration_seconds()),
            "Audio decoded"
        );

        Ok(waveform)
    }
}

/// Native-rate decode result
struct DecodedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::EmptyAudio);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| ExtractionError::Decode(format!("unrecognized audio container: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ExtractionError::Decode("no audio track found".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ExtractionError::Decode("sample rate unknown".to_string()))?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ExtractionError::Decode(format!("unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                // End of stream
                break;
            }
            Err(e) => return Err(ExtractionError::Decode(format!("error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| ExtractionError::Decode(format!("failed to decode packet: {}", e)))?;

        append_mono(decoded, &mut samples);
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Average all channels of a decoded buffer into `out`
fn append_mono(decoded: AudioBufferRef<'_>, out: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::U8(buf) => mix_to_mono(&buf, out),
        AudioBufferRef::U16(buf) => mix_to_mono(&buf, out),
        AudioBufferRef::U24(buf) => mix_to_mono(&buf, out),
        AudioBufferRef::U32(buf) => mix_to_mono(&buf, out),
        AudioBufferRef::S8(buf) => mix_to_mono(&buf, out),
        AudioBufferRef::S16(buf) => mix_to_mono(&buf, out),
        AudioBufferRef::S24(buf) => mix_to_mono(&buf, out),
        AudioBufferRef::S32(buf) => mix_to_mono(&buf, out),
        AudioBufferRef::F32(buf) => mix_to_mono(&buf, out),
        AudioBufferRef::F64(buf) => mix_to_mono(&buf, out),
    }
}

fn mix_to_mono<S>(buf: &AudioBuffer<S>, out: &mut Vec<f32>)
where
    S: Sample,
    f32: FromSample<S>,
{
    let num_channels = buf.spec().channels.count();
    let num_frames = buf.frames();
    if num_channels == 0 {
        return;
    }

    out.reserve(num_frames);
    for frame_idx in 0..num_frames {
        let mut sum = 0.0f32;
        for ch in 0..num_channels {
            sum += f32::from_sample(buf.chan(ch)[frame_idx]);
        }
        out.push(sum / num_channels as f32);
    }
}

/// Filter length of the resampler, in input frames
const SINC_LEN: usize = 256;

/// Resample mono PCM with rubato
///
/// # Algorithm
/// - Sinc interpolation with BlackmanHarris2 window
/// - 256-tap filter, 0.95 cutoff to prevent aliasing
/// - Chunk size equals input length; zero chunks flush the filter tail
/// - Output holds `ceil(n * ratio)` samples, sample `m` at input time `m / ratio`
///
/// `SincFixedIn` centres its first output on the first input frame, so only
/// the tail held back by the filter needs flushing; nothing is trimmed at the
/// start.
pub(crate) fn resample_mono(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, ExtractionError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let expected = resampled_len(samples.len(), source_rate, target_rate);

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| ExtractionError::Resample(e.to_string()))?;

    let input = vec![samples.to_vec()];
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| ExtractionError::Resample(e.to_string()))?;
    let mut resampled = output.pop().unwrap_or_default();
    let held_back = expected.saturating_sub(resampled.len());

    // Chunks shorter than the filter need several zero chunks before the
    // held-back frames come out
    let zeros_needed = 2 * SINC_LEN + (expected as f64 / ratio).ceil() as usize;
    let max_flushes = zeros_needed / samples.len() + 2;
    let mut flushes = 0;
    while resampled.len() < expected && flushes < max_flushes {
        let mut tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| ExtractionError::Resample(e.to_string()))?;
        resampled.extend(tail.pop().unwrap_or_default());
        flushes += 1;
    }
    resampled.truncate(expected);

    debug!(
        "Resampled {} samples ({} Hz) -> {} samples ({} Hz), {} flushed from the filter tail",
        samples.len(),
        source_rate,
        resampled.len(),
        target_rate,
        held_back
    );

    Ok(resampled)
}

/// `ceil(len * target / source)` in integer arithmetic
fn resampled_len(len: usize, source_rate: u32, target_rate: u32) -> usize {
    let scaled = len as u64 * target_rate as u64;
    scaled.div_ceil(source_rate as u64) as usize
}
