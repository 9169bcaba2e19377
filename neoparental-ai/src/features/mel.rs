//! Mel filterbank, mel power spectrogram and MFCC
//!
//! Slaney mel scale: linear below 1 kHz, logarithmic above. Filters are
//! triangular with area normalization (`2 / bandwidth`).

use ndarray::Array2;

use super::spectrum::{fft_frequencies, power_to_db};

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub(crate) fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub(crate) fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Mel filterbank, shape `(n_mels, n_fft / 2 + 1)`, spanning 0 Hz to Nyquist
pub(crate) fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f64> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| {
            let mel = min_mel + (max_mel - min_mel) * i as f64 / (n_mels + 1) as f64;
            mel_to_hz(mel)
        })
        .collect();

    let mut weights = Array2::<f64>::zeros((n_mels, fft_freqs.len()));
    for m in 0..n_mels {
        let lower_width = mel_points[m + 1] - mel_points[m];
        let upper_width = mel_points[m + 2] - mel_points[m + 1];
        let enorm = 2.0 / (mel_points[m + 2] - mel_points[m]);

        for (k, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - mel_points[m]) / lower_width;
            let upper = (mel_points[m + 2] - freq) / upper_width;
            weights[[m, k]] = lower.min(upper).max(0.0) * enorm;
        }
    }

    weights
}

/// Orthonormal DCT-II basis, shape `(n_out, n_in)`
pub(crate) fn dct_basis(n_out: usize, n_in: usize) -> Array2<f64> {
    let n = n_in as f64;
    Array2::from_shape_fn((n_out, n_in), |(k, i)| {
        let scale = if k == 0 {
            (1.0 / n).sqrt()
        } else {
            (2.0 / n).sqrt()
        };
        scale * (std::f64::consts::PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n)).cos()
    })
}

/// Mel power spectrogram from a magnitude spectrogram
pub(crate) fn mel_power(magnitude: &Array2<f64>, mel_basis: &Array2<f64>) -> Array2<f64> {
    let power = magnitude.mapv(|v| v * v);
    mel_basis.dot(&power)
}

/// MFCC from a mel power spectrogram
pub(crate) fn mfcc(mel_power: &Array2<f64>, dct: &Array2<f64>) -> Array2<f64> {
    dct.dot(&power_to_db(mel_power))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scale_round_trip_and_breakpoint() {
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-12);
        assert!((hz_to_mel(500.0) - 7.5).abs() < 1e-12);
        for hz in [0.0, 250.0, 999.0, 1000.0, 4000.0, 8000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
    }

    #[test]
    fn test_filterbank_shape_and_nonnegative() {
        let fb = mel_filterbank(16_000, 1024, 128);
        assert_eq!(fb.dim(), (128, 513));
        assert!(fb.iter().all(|&w| w >= 0.0));
        // Narrow low-frequency filters may fall between bins
        let non_empty = fb.rows().into_iter().filter(|r| r.sum() > 0.0).count();
        assert!(non_empty > 100);
    }

    #[test]
    fn test_dct_is_orthonormal() {
        let d = dct_basis(8, 8);
        let identity = d.dot(&d.t());
        for i in 0..8 {
            for j in 0..8 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((identity[[i, j]] - expected).abs() < 1e-9);
            }
        }
    }
}
