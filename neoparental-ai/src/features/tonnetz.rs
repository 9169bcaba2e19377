//! Constant-Q chroma and tonal centroid (tonnetz) features
//!
//! The constant-Q transform uses one Hann-windowed complex exponential per
//! bin, with window length inversely proportional to frequency. Only the top
//! octave's kernels are built, as sparse spectra of one short FFT; each lower
//! octave reuses them after the signal is resampled to half the rate and the
//! hop halved. Bins are folded into 12 pitch classes and projected onto three
//! circles: fifths, minor thirds, major thirds.

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

use super::spectrum::{frame_count, hann, normalize_columns, Norm};
use crate::audio::decoder::resample_mono;
use crate::error::ExtractionError;

/// Lowest constant-Q bin (C1)
const C1_HZ: f64 = 32.703_195_662_574_83;
pub(crate) const CQT_BINS_PER_OCTAVE: usize = 36;
const CQT_OCTAVES: usize = 7;
pub(crate) const CQT_HOP_LENGTH: usize = 512;

/// Share of each kernel spectrum's L1 mass dropped when sparsifying
const SPARSITY_QUANTILE: f64 = 0.01;

// Every halving must leave an integer hop
const _: () = assert!(CQT_HOP_LENGTH % (1 << (CQT_OCTAVES - 1)) == 0);

/// Number of tonnetz dimensions
pub(crate) const TONNETZ_DIMS: usize = 6;

/// Kernel length factor: a bin at `f` Hz spans `Q * sr / f` samples
///
/// Derived from the bandwidth of adjacent bins, `alpha = (r^2 - 1) / (r^2 + 1)`
/// with `r = 2^(1 / bins_per_octave)`.
fn filter_q() -> f64 {
    let r2 = 2f64.powf(2.0 / CQT_BINS_PER_OCTAVE as f64);
    (r2 + 1.0) / (r2 - 1.0)
}

/// Top-octave kernels in the frequency domain
struct OctaveKernels {
    n_fft: usize,
    /// Kernel length per bin, in samples at the full rate
    lengths: Vec<f64>,
    /// Sparse conjugate spectra scaled by `1 / (n_fft * window_sum)`
    spectra: Vec<Vec<(usize, Complex<f64>)>>,
}

impl OctaveKernels {
    fn new(sample_rate: u32, tuning: f64) -> Self {
        let bpo = CQT_BINS_PER_OCTAVE as f64;
        let sr = sample_rate as f64;
        let q = filter_q();
        let fmin = C1_HZ * 2f64.powf(tuning / bpo);
        let first = (CQT_OCTAVES - 1) * CQT_BINS_PER_OCTAVE;

        // (freq, length, start, end) per bin; the kernel covers [start, end)
        let extents: Vec<(f64, f64, i64, i64)> = (0..CQT_BINS_PER_OCTAVE)
            .map(|b| {
                let freq = fmin * 2f64.powf((first + b) as f64 / bpo);
                let length = q * sr / freq;
                let start = (-length / 2.0).floor() as i64;
                let end = (length / 2.0).floor() as i64;
                (freq, length, start, end)
            })
            .collect();

        let half = extents
            .iter()
            .map(|&(_, _, start, end)| (-start).max(end + 1))
            .max()
            .unwrap_or(1) as usize;
        let n_fft = (2 * half).next_power_of_two();

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let mut lengths = Vec::with_capacity(CQT_BINS_PER_OCTAVE);
        let mut spectra = Vec::with_capacity(CQT_BINS_PER_OCTAVE);

        for (freq, length, start, end) in extents {
            let window = hann((end - start) as usize);
            let window_sum: f64 = window.iter().sum();

            let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
            for (m, w) in window.iter().enumerate() {
                let offset = start + m as i64;
                let phase = 2.0 * PI * freq * offset as f64 / sr;
                buffer[(offset + n_fft as i64 / 2) as usize] = Complex::from_polar(*w, phase);
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);

            let scale = 1.0 / (n_fft as f64 * window_sum);
            let spectrum: Vec<Complex<f64>> = buffer.iter().map(|g| g.conj() * scale).collect();

            lengths.push(length);
            spectra.push(sparsify(&spectrum, SPARSITY_QUANTILE));
        }

        Self {
            n_fft,
            lengths,
            spectra,
        }
    }
}

/// Drop the smallest entries holding `quantile` of the L1 mass
fn sparsify(spectrum: &[Complex<f64>], quantile: f64) -> Vec<(usize, Complex<f64>)> {
    let mut magnitudes: Vec<f64> = spectrum.iter().map(|c| c.norm()).collect();
    let total: f64 = magnitudes.iter().sum();
    if total <= 0.0 {
        return Vec::new();
    }

    magnitudes.sort_by(|a, b| a.total_cmp(b));
    let mut cumulative = 0.0;
    let mut threshold = 0.0;
    for m in magnitudes {
        cumulative += m;
        if cumulative / total >= quantile {
            threshold = m;
            break;
        }
    }

    spectrum
        .iter()
        .enumerate()
        .filter(|(_, c)| c.norm() >= threshold)
        .map(|(i, c)| (i, *c))
        .collect()
}

/// Constant-Q magnitude, shape `(252, n_frames)`
///
/// `tuning` shifts the whole bin grid by a fraction of a bin. Frame `t` is
/// centred on sample `t * 512` in every octave. A sinusoid of amplitude `a`
/// on a bin's centre frequency reads `a * sqrt(length) / 2` in that bin.
pub(crate) fn constant_q_magnitude(
    samples: &[f32],
    sample_rate: u32,
    tuning: f64,
) -> Result<Array2<f64>, ExtractionError> {
    let n_frames = frame_count(samples.len(), CQT_HOP_LENGTH);
    if n_frames == 0 {
        return Err(ExtractionError::NoFrames {
            samples: samples.len(),
        });
    }

    let kernels = OctaveKernels::new(sample_rate, tuning);
    let half = (kernels.n_fft / 2) as i64;

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(kernels.n_fft);
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut buffer = vec![Complex::new(0.0, 0.0); kernels.n_fft];

    let mut cqt = Array2::<f64>::zeros((CQT_BINS_PER_OCTAVE * CQT_OCTAVES, n_frames));

    let mut signal = samples.to_vec();
    let mut rate = sample_rate;
    let mut hop = CQT_HOP_LENGTH;

    for level in 0..CQT_OCTAVES {
        if level > 0 {
            signal = resample_mono(&signal, rate, rate / 2)?;
            rate /= 2;
            hop /= 2;
        }

        let octave = CQT_OCTAVES - 1 - level;
        let gains: Vec<f64> = kernels
            .lengths
            .iter()
            .map(|length| (length * (1u32 << level) as f64).sqrt())
            .collect();

        for t in 0..n_frames {
            let origin = (t * hop) as i64 - half;
            for (p, slot) in buffer.iter_mut().enumerate() {
                let i = origin + p as i64;
                let x = if i >= 0 && (i as usize) < signal.len() {
                    signal[i as usize] as f64
                } else {
                    0.0
                };
                *slot = Complex::new(x, 0.0);
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);

            for (b, spectrum) in kernels.spectra.iter().enumerate() {
                let response = spectrum
                    .iter()
                    .fold(Complex::new(0.0, 0.0), |acc, &(i, g)| acc + buffer[i] * g);
                cqt[[octave * CQT_BINS_PER_OCTAVE + b, t]] = gains[b] * response.norm();
            }
        }
    }

    Ok(cqt)
}

/// Fold constant-Q bins into 12 pitch classes, each frame scaled to peak 1
///
/// Each pitch class collects the three bins centred on it.
pub(crate) fn chroma_from_cqt(cqt: &Array2<f64>) -> Array2<f64> {
    let merge = CQT_BINS_PER_OCTAVE / 12;
    let mut chroma = Array2::<f64>::zeros((12, cqt.ncols()));

    for (k, row) in cqt.rows().into_iter().enumerate() {
        let within_octave = k % CQT_BINS_PER_OCTAVE;
        let class = ((within_octave + merge / 2) / merge) % 12;
        let mut target = chroma.row_mut(class);
        target += &row;
    }

    normalize_columns(&mut chroma, Norm::Max);
    chroma
}

/// Projection from 12 pitch classes onto the tonal centroid space
fn tonnetz_basis() -> Array2<f64> {
    const SCALE: [f64; TONNETZ_DIMS] = [7.0 / 6.0, 7.0 / 6.0, 1.5, 1.5, 2.0 / 3.0, 2.0 / 3.0];
    const RADIUS: [f64; TONNETZ_DIMS] = [1.0, 1.0, 1.0, 1.0, 0.5, 0.5];

    Array2::from_shape_fn((TONNETZ_DIMS, 12), |(p, c)| {
        let mut v = SCALE[p] * c as f64;
        if p % 2 == 0 {
            v -= 0.5;
        }
        RADIUS[p] * (PI * v).cos()
    })
}

/// Tonal centroid features from a pitch-class chroma, shape `(6, n_frames)`
pub(crate) fn tonnetz(chroma: &Array2<f64>) -> Array2<f64> {
    let mut distribution = chroma.clone();
    normalize_columns(&mut distribution, Norm::L1);
    tonnetz_basis().dot(&distribution)
}
