//! Tuning estimation and STFT chroma
//!
//! Tuning is the deviation (in fractions of a bin) of the clip's pitch grid
//! from A440. It is estimated once per clip from spectral peaks and reused
//! by both the STFT chroma (12 bins per octave) and the constant-Q chroma
//! behind tonnetz (36 bins per octave).

use ndarray::Array2;

use super::spectrum::{fft_frequencies, normalize_columns, Norm};

/// Pitch tracking range
const PITCH_FMIN: f64 = 150.0;
const PITCH_FMAX: f64 = 4000.0;

/// Peaks below this fraction of the frame maximum are ignored
const PITCH_THRESHOLD: f64 = 0.1;

/// Tuning histogram resolution (fraction of a bin)
const TUNING_RESOLUTION: f64 = 0.01;

/// Chroma filter weighting: centre octave and octave spread
const CHROMA_CENTER_OCTAVE: f64 = 5.0;
const CHROMA_OCTAVE_WIDTH: f64 = 2.0;

/// Octaves above A440 / 16 (A0 = 27.5 Hz), shifted by `tuning` bins
fn hz_to_octs(hz: f64, tuning: f64, bins_per_octave: usize) -> f64 {
    let a440 = 440.0 * 2f64.powf(tuning / bins_per_octave as f64);
    (hz / (a440 / 16.0)).log2()
}

/// Salient spectral peaks of a clip, used to estimate tuning
#[derive(Debug, Clone, Default)]
pub(crate) struct PitchPeaks {
    frequencies: Vec<f64>,
}

impl PitchPeaks {
    /// Pick parabolic-interpolated local maxima from a magnitude spectrogram
    ///
    /// Only peaks that are at least as strong as the median peak are kept.
    pub fn track(magnitude: &Array2<f64>, sample_rate: u32, n_fft: usize) -> Self {
        let freqs = fft_frequencies(sample_rate, n_fft);
        let fmax = PITCH_FMAX.min(sample_rate as f64 / 2.0);
        let n_bins = magnitude.nrows();

        let mut candidates: Vec<(f64, f64)> = Vec::new();

        for column in magnitude.columns() {
            let frame_max = column.iter().fold(0.0f64, |acc, &v| acc.max(v));
            let ref_value = PITCH_THRESHOLD * frame_max;
            let gated = |i: usize| {
                let v = column[i];
                if v > ref_value {
                    v
                } else {
                    0.0
                }
            };

            for i in 1..n_bins {
                if !(PITCH_FMIN <= freqs[i] && freqs[i] < fmax) {
                    continue;
                }

                let here = gated(i);
                let next = if i + 1 < n_bins { gated(i + 1) } else { here };
                if !(here > gated(i - 1) && here >= next) {
                    continue;
                }

                let (shift, slope) = if i + 1 < n_bins {
                    let curvature = column[i + 1] + column[i - 1] - 2.0 * column[i];
                    let slope = 0.5 * (column[i + 1] - column[i - 1]);
                    if slope.abs() < curvature.abs() {
                        (-slope / curvature, slope)
                    } else {
                        (0.0, slope)
                    }
                } else {
                    (0.0, 0.0)
                };

                let pitch = (i as f64 + shift) * sample_rate as f64 / n_fft as f64;
                let strength = column[i] + 0.5 * slope * shift;
                if pitch > 0.0 {
                    candidates.push((pitch, strength));
                }
            }
        }

        if candidates.is_empty() {
            return Self::default();
        }

        let threshold = median(candidates.iter().map(|&(_, m)| m).collect());
        let frequencies = candidates
            .into_iter()
            .filter(|&(_, m)| m >= threshold)
            .map(|(p, _)| p)
            .collect();

        Self { frequencies }
    }

    /// Tuning offset in fractions of a bin, in `[-0.5, 0.5)`
    ///
    /// Returns 0.0 when no peaks were found (silence, noise floor).
    pub fn tuning(&self, bins_per_octave: usize) -> f64 {
        let residuals: Vec<f64> = self
            .frequencies
            .iter()
            .filter(|&&f| f > 0.0)
            .map(|&f| {
                let r = (bins_per_octave as f64 * hz_to_octs(f, 0.0, 12)).rem_euclid(1.0);
                if r >= 0.5 {
                    r - 1.0
                } else {
                    r
                }
            })
            .collect();

        if residuals.is_empty() {
            return 0.0;
        }

        let n_bins = (1.0 / TUNING_RESOLUTION).ceil() as usize;
        let edge = |i: usize| -0.5 + i as f64 * (1.0 / n_bins as f64);

        let mut counts = vec![0usize; n_bins];
        for r in residuals {
            if !(-0.5..=0.5).contains(&r) {
                continue;
            }
            let mut idx = (((r + 0.5) * n_bins as f64) as usize).min(n_bins - 1);
            if r < edge(idx) {
                idx = idx.saturating_sub(1);
            } else if idx != n_bins - 1 && r >= edge(idx + 1) {
                idx += 1;
            }
            counts[idx] += 1;
        }

        let best = counts
            .iter()
            .enumerate()
            .fold((0usize, 0usize), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
            .0;

        edge(best)
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Gaussian chroma filterbank, shape `(n_chroma, n_fft / 2 + 1)`
///
/// Rows start at C. Each STFT bin spreads its energy over neighbouring pitch
/// classes with a Gaussian whose width follows the bin spacing, and the whole
/// bank is weighted towards octave 5.
pub(crate) fn chroma_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_chroma: usize,
    tuning: f64,
) -> Array2<f64> {
    let n_chroma_f = n_chroma as f64;

    // Pitch position of every non-DC bin over the full (two-sided) grid,
    // with a virtual DC entry 1.5 octaves below the first bin
    let mut frq_bins = Vec::with_capacity(n_fft);
    frq_bins.push(0.0);
    for k in 1..n_fft {
        let hz = k as f64 * sample_rate as f64 / n_fft as f64;
        frq_bins.push(n_chroma_f * hz_to_octs(hz, tuning, n_chroma));
    }
    frq_bins[0] = frq_bins[1] - 1.5 * n_chroma_f;

    let bin_widths: Vec<f64> = (0..n_fft)
        .map(|j| {
            if j + 1 < n_fft {
                (frq_bins[j + 1] - frq_bins[j]).max(1.0)
            } else {
                1.0
            }
        })
        .collect();

    let half = (n_chroma_f / 2.0).round();
    let mut weights = Array2::<f64>::zeros((n_chroma, n_fft));
    for c in 0..n_chroma {
        for j in 0..n_fft {
            let d = (frq_bins[j] - c as f64 + half + 10.0 * n_chroma_f).rem_euclid(n_chroma_f) - half;
            weights[[c, j]] = (-0.5 * (2.0 * d / bin_widths[j]).powi(2)).exp();
        }
    }

    normalize_columns(&mut weights, Norm::L2);

    for j in 0..n_fft {
        let octave_weight =
            (-0.5 * ((frq_bins[j] / n_chroma_f - CHROMA_CENTER_OCTAVE) / CHROMA_OCTAVE_WIDTH).powi(2))
                .exp();
        for c in 0..n_chroma {
            weights[[c, j]] *= octave_weight;
        }
    }

    // Rows were built relative to A; rotate so row 0 is C
    let shift = 3 * (n_chroma / 12);
    let n_keep = n_fft / 2 + 1;
    Array2::from_shape_fn((n_chroma, n_keep), |(c, j)| weights[[(c + shift) % n_chroma, j]])
}

/// Chroma from a magnitude spectrogram, each frame scaled to peak 1
pub(crate) fn chroma_stft(
    magnitude: &Array2<f64>,
    sample_rate: u32,
    n_fft: usize,
    tuning: f64,
) -> Array2<f64> {
    let filterbank = chroma_filterbank(sample_rate, n_fft, 12, tuning);
    let mut chroma = filterbank.dot(magnitude);
    normalize_columns(&mut chroma, Norm::Max);
    chroma
}
