//! Framed spectral analysis shared by every feature family
//!
//! Frames are centered: the signal is zero-padded by `n_fft / 2` on both
//! sides, so a waveform of `n` samples yields `1 + n / hop` frames.

use ndarray::{Array, Array2, Axis, Dimension};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::ExtractionError;

/// `power_to_db` floor
pub(crate) const AMIN: f64 = 1e-10;

/// `power_to_db` dynamic range relative to the array maximum
pub(crate) const TOP_DB: f64 = 80.0;

/// STFT framing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StftParams {
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
}

impl StftParams {
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }
}

/// Number of centered frames for `n_samples` at `hop_length`
pub(crate) fn frame_count(n_samples: usize, hop_length: usize) -> usize {
    if n_samples == 0 {
        0
    } else {
        1 + n_samples / hop_length
    }
}

/// Periodic Hann window (the FFT-friendly variant)
pub(crate) fn hann(len: usize) -> Vec<f64> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / len as f64).cos())
        .collect()
}

/// Hann window of `win_length` zero-padded to `n_fft`, centered
fn padded_window(params: &StftParams) -> Vec<f64> {
    let mut window = vec![0.0; params.n_fft];
    let offset = (params.n_fft - params.win_length) / 2;
    for (i, w) in hann(params.win_length).into_iter().enumerate() {
        window[offset + i] = w;
    }
    window
}

/// Magnitude spectrogram, shape `(n_fft / 2 + 1, n_frames)`
pub(crate) fn magnitude_spectrogram(
    samples: &[f32],
    params: &StftParams,
) -> Result<Array2<f64>, ExtractionError> {
    let n_frames = frame_count(samples.len(), params.hop_length);
    if n_frames == 0 {
        return Err(ExtractionError::NoFrames {
            samples: samples.len(),
        });
    }

    let window = padded_window(params);
    let pad = params.n_fft / 2;
    let n_bins = params.n_bins();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(params.n_fft);
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut buffer = vec![Complex::new(0.0, 0.0); params.n_fft];

    let mut spectrogram = Array2::<f64>::zeros((n_bins, n_frames));

    for frame_idx in 0..n_frames {
        let start = (frame_idx * params.hop_length) as isize - pad as isize;

        for (i, slot) in buffer.iter_mut().enumerate() {
            let pos = start + i as isize;
            let sample = if pos >= 0 && (pos as usize) < samples.len() {
                samples[pos as usize] as f64
            } else {
                0.0
            };
            *slot = Complex::new(sample * window[i], 0.0);
        }

        fft.process_with_scratch(&mut buffer, &mut scratch);

        for (bin, value) in buffer.iter().take(n_bins).enumerate() {
            spectrogram[[bin, frame_idx]] = value.norm();
        }
    }

    Ok(spectrogram)
}

/// Centre frequency of every STFT bin
pub(crate) fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f64> {
    (0..=n_fft / 2)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect()
}

/// Convert power to decibels (`ref = 1.0`), clipped to `TOP_DB` below the peak
pub(crate) fn power_to_db<D: Dimension>(power: &Array<f64, D>) -> Array<f64, D> {
    let mut db = power.mapv(|v| 10.0 * v.max(AMIN).log10());
    let peak = db.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let floor = peak - TOP_DB;
    db.mapv_inplace(|v| v.max(floor));
    db
}

/// Column normalization norms
#[derive(Debug, Clone, Copy)]
pub(crate) enum Norm {
    L1,
    L2,
    Max,
}

/// Normalize each column (axis 0) of `m` in place
///
/// Columns whose norm is below the smallest positive normal float are left
/// unscaled, so an all-zero column stays all-zero.
pub(crate) fn normalize_columns(m: &mut Array2<f64>, norm: Norm) {
    for mut column in m.axis_iter_mut(Axis(1)) {
        let length = match norm {
            Norm::L1 => column.iter().map(|v| v.abs()).sum::<f64>(),
            Norm::L2 => column.iter().map(|v| v * v).sum::<f64>().sqrt(),
            Norm::Max => column.iter().fold(0.0f64, |acc, v| acc.max(v.abs())),
        };
        if length >= f64::MIN_POSITIVE {
            column.mapv_inplace(|v| v / length);
        }
    }
}

/// Per-row mean across frames
pub(crate) fn frame_mean(m: &Array2<f64>) -> Vec<f64> {
    m.mean_axis(Axis(1))
        .map(|mean| mean.to_vec())
        .unwrap_or_else(|| vec![0.0; m.nrows()])
}

/// Per-row population standard deviation across frames
pub(crate) fn frame_std(m: &Array2<f64>) -> Vec<f64> {
    if m.ncols() == 0 {
        return vec![0.0; m.nrows()];
    }
    m.std_axis(Axis(1), 0.0).to_vec()
}
