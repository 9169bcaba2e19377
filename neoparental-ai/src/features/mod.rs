//! Feature Extraction
//!
//! **Purpose:** Turn a 16 kHz mono waveform into the fixed-length vector the
//! served model was trained on.
//!
//! **Families:** MFCC (40), chroma (12), mel (128), spectral contrast (8),
//! tonnetz (6). Each is a per-frame matrix reduced to one statistic per row by
//! averaging across frames. The concatenation order is fixed by
//! [`FeatureLayout`] and must match the layout used at training time.
//!
//! All analysis constants below are shared with the training pipeline and
//! never vary per request.

mod chroma;
mod contrast;
mod mel;
mod spectrum;
mod tonnetz;

use ndarray::{Array2, ArrayView1};
use once_cell::sync::Lazy;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::audio::{Waveform, TARGET_SAMPLE_RATE};
use crate::error::{ExtractionError, UnknownLayout};
use chroma::PitchPeaks;
use contrast::ContrastBand;
use spectrum::{frame_mean, frame_std, magnitude_spectrogram, StftParams};

/// Number of MFCC coefficients
pub const N_MFCC: usize = 40;
/// Number of mel bands
pub const N_MELS: usize = 128;
/// Number of chroma bins
pub const N_CHROMA: usize = 12;
/// Number of contrast octave bands (output has one more row)
pub const N_CONTRAST_BANDS: usize = 7;
/// Lower edge of the first contrast octave band (Hz)
pub const CONTRAST_FMIN: f64 = 100.0;
const CONTRAST_QUANTILE: f64 = 0.02;
const N_CONTRAST: usize = N_CONTRAST_BANDS + 1;
const N_TONNETZ: usize = tonnetz::TONNETZ_DIMS;

/// MFCC and mel analysis: 1024-point FFT, 10 ms hop, 25 ms window
const MEL_STFT: StftParams = StftParams {
    n_fft: 1024,
    hop_length: 160,
    win_length: 400,
};

/// Chroma and contrast analysis
const WIDE_STFT: StftParams = StftParams {
    n_fft: 2048,
    hop_length: 512,
    win_length: 2048,
};

static MEL_BASIS: Lazy<Array2<f64>> =
    Lazy::new(|| mel::mel_filterbank(TARGET_SAMPLE_RATE, MEL_STFT.n_fft, N_MELS));

static DCT: Lazy<Array2<f64>> = Lazy::new(|| mel::dct_basis(N_MFCC, N_MELS));

static CONTRAST_BANDS: Lazy<Vec<ContrastBand>> = Lazy::new(|| {
    contrast::contrast_bands(
        TARGET_SAMPLE_RATE,
        WIDE_STFT.n_fft,
        N_CONTRAST_BANDS,
        CONTRAST_FMIN,
        CONTRAST_QUANTILE,
    )
});

/// Feature vector layouts produced by the training pipeline revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureLayout {
    /// mfcc, chroma, mel, contrast, tonnetz (194 values)
    #[default]
    Standard,
    /// mfcc-std prepended to the standard layout (234 values)
    WithMfccStd,
    /// mfcc, chroma, mel (180 values)
    Compact,
}

impl FeatureLayout {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureLayout::Standard => "standard",
            FeatureLayout::WithMfccStd => "with_mfcc_std",
            FeatureLayout::Compact => "compact",
        }
    }

    /// Vector length produced by this layout
    pub fn len(&self) -> usize {
        let base = N_MFCC + N_CHROMA + N_MELS;
        match self {
            FeatureLayout::Standard => base + N_CONTRAST + N_TONNETZ,
            FeatureLayout::WithMfccStd => N_MFCC + base + N_CONTRAST + N_TONNETZ,
            FeatureLayout::Compact => base,
        }
    }

    fn has_tonal_families(&self) -> bool {
        !matches!(self, FeatureLayout::Compact)
    }
}

impl fmt::Display for FeatureLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureLayout {
    type Err = UnknownLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(FeatureLayout::Standard),
            "with_mfcc_std" => Ok(FeatureLayout::WithMfccStd),
            "compact" => Ok(FeatureLayout::Compact),
            other => Err(UnknownLayout(other.to_string())),
        }
    }
}

/// Ordered, fixed-length feature values for one clip
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
    layout: FeatureLayout,
}

impl FeatureVector {
    /// Wrap precomputed values (length must match the layout)
    pub fn new(values: Vec<f64>, layout: FeatureLayout) -> Result<Self, ExtractionError> {
        if values.len() != layout.len() {
            return Err(ExtractionError::Length {
                layout: layout.name(),
                expected: layout.len(),
                actual: values.len(),
            });
        }
        Ok(Self { values, layout })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Single-row view handed to the model
    pub fn view(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(self.values.as_slice())
    }
}

/// Per-frame family matrices for one waveform
struct FrameFeatures {
    mfcc: Array2<f64>,
    chroma: Array2<f64>,
    mel: Array2<f64>,
    contrast: Option<Array2<f64>>,
    tonnetz: Option<Array2<f64>>,
}

/// Deterministic waveform-to-vector transform for one layout
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor {
    layout: FeatureLayout,
}

impl FeatureExtractor {
    pub fn new(layout: FeatureLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    /// Extract the feature vector for `waveform`
    ///
    /// # Errors
    /// - `SampleRate` if the waveform is not 16 kHz
    /// - `EmptyAudio` / `NoFrames` if there is nothing to analyse
    /// - `NonFinite` if any family produced NaN or infinity
    pub fn extract(&self, waveform: &Waveform) -> Result<FeatureVector, ExtractionError> {
        if waveform.sample_rate != TARGET_SAMPLE_RATE {
            return Err(ExtractionError::SampleRate {
                expected: TARGET_SAMPLE_RATE,
                actual: waveform.sample_rate,
            });
        }
        if waveform.samples.is_empty() {
            return Err(ExtractionError::EmptyAudio);
        }

        let frames = self.frame_features(&waveform.samples)?;

        let mut values = Vec::with_capacity(self.layout.len());
        if self.layout == FeatureLayout::WithMfccStd {
            values.extend(frame_std(&frames.mfcc));
        }
        values.extend(frame_mean(&frames.mfcc));
        values.extend(frame_mean(&frames.chroma));
        values.extend(frame_mean(&frames.mel));
        if let Some(contrast) = &frames.contrast {
            values.extend(frame_mean(contrast));
        }
        if let Some(tonnetz) = &frames.tonnetz {
            values.extend(frame_mean(tonnetz));
        }

        debug!(
            layout = %self.layout,
            samples = waveform.samples.len(),
            frames = frames.mfcc.ncols(),
            "Extracted feature vector"
        );

        FeatureVector::new(values, self.layout)
    }

    fn frame_features(&self, samples: &[f32]) -> Result<FrameFeatures, ExtractionError> {
        let spectrum = magnitude_spectrogram(samples, &MEL_STFT)?;
        let mel = mel::mel_power(&spectrum, &MEL_BASIS);
        let mfcc = mel::mfcc(&mel, &DCT);
        ensure_finite("mfcc", &mfcc)?;
        ensure_finite("mel", &mel)?;

        let wide = magnitude_spectrogram(samples, &WIDE_STFT)?;
        let peaks = PitchPeaks::track(&wide, TARGET_SAMPLE_RATE, WIDE_STFT.n_fft);
        let tuning = peaks.tuning(N_CHROMA);
        let chroma = chroma::chroma_stft(&wide, TARGET_SAMPLE_RATE, WIDE_STFT.n_fft, tuning);
        ensure_finite("chroma", &chroma)?;

        let (contrast, tonnetz) = if self.layout.has_tonal_families() {
            let contrast = contrast::spectral_contrast(&wide, &CONTRAST_BANDS);
            ensure_finite("contrast", &contrast)?;

            // Constant-Q tuning is estimated at 36 bins per octave
            let cqt_tuning = peaks.tuning(tonnetz::CQT_BINS_PER_OCTAVE);
            let cqt = tonnetz::constant_q_magnitude(samples, TARGET_SAMPLE_RATE, cqt_tuning)?;
            let tonnetz = tonnetz::tonnetz(&tonnetz::chroma_from_cqt(&cqt));
            ensure_finite("tonnetz", &tonnetz)?;

            (Some(contrast), Some(tonnetz))
        } else {
            (None, None)
        };

        Ok(FrameFeatures {
            mfcc,
            chroma,
            mel,
            contrast,
            tonnetz,
        })
    }
}

fn ensure_finite(family: &'static str, m: &Array2<f64>) -> Result<(), ExtractionError> {
    if m.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ExtractionError::NonFinite { family })
    }
}
