//! Octave-band spectral contrast
//!
//! For each octave band the spectrum is sorted and the mean of the top and
//! bottom `quantile` of bins gives a peak and a valley level. Contrast is the
//! dB difference between the two.

use ndarray::Array2;

use super::spectrum::{fft_frequencies, power_to_db};

/// One analysis band: the bins it sorts and how many it averages
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ContrastBand {
    /// STFT bin indices included in the sort
    pub bins: Vec<usize>,
    /// Number of bins averaged at each end
    pub take: usize,
}

/// Band layout for `n_bands` octaves starting at `fmin`
///
/// Produces `n_bands + 1` bands: `[0, fmin]`, then octaves up to
/// `fmin * 2^n_bands`. Each band after the first borrows the bin just below
/// its lower edge; every band except the last drops its top bin; the last
/// band extends to Nyquist.
pub(crate) fn contrast_bands(
    sample_rate: u32,
    n_fft: usize,
    n_bands: usize,
    fmin: f64,
    quantile: f64,
) -> Vec<ContrastBand> {
    let freqs = fft_frequencies(sample_rate, n_fft);

    let mut edges = vec![0.0];
    edges.extend((0..=n_bands).map(|i| fmin * 2f64.powi(i as i32)));

    let mut bands = Vec::with_capacity(n_bands + 1);
    for k in 0..=n_bands {
        let (low, high) = (edges[k], edges[k + 1]);
        let mut member: Vec<bool> = freqs.iter().map(|&f| f >= low && f <= high).collect();

        let first = member.iter().position(|&m| m);
        let last = member.iter().rposition(|&m| m);

        if k > 0 {
            if let Some(first) = first {
                if first > 0 {
                    member[first - 1] = true;
                }
            }
        }
        if k == n_bands {
            if let Some(last) = last {
                for m in member.iter_mut().skip(last + 1) {
                    *m = true;
                }
            }
        }

        let count = member.iter().filter(|&&m| m).count();
        let take = ((quantile * count as f64).round_ties_even() as usize).max(1);

        let mut bins: Vec<usize> = member
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect();
        if k < n_bands {
            bins.pop();
        }

        bands.push(ContrastBand { bins, take });
    }

    bands
}

/// Spectral contrast, shape `(bands.len(), n_frames)`
pub(crate) fn spectral_contrast(magnitude: &Array2<f64>, bands: &[ContrastBand]) -> Array2<f64> {
    let n_frames = magnitude.ncols();
    let mut peak = Array2::<f64>::zeros((bands.len(), n_frames));
    let mut valley = Array2::<f64>::zeros((bands.len(), n_frames));

    let mut sorted = Vec::new();
    for (k, band) in bands.iter().enumerate() {
        if band.bins.is_empty() {
            continue;
        }
        let take = band.take.min(band.bins.len());

        for t in 0..n_frames {
            sorted.clear();
            sorted.extend(band.bins.iter().map(|&b| magnitude[[b, t]]));
            sorted.sort_by(|a, b| a.total_cmp(b));

            valley[[k, t]] = sorted[..take].iter().sum::<f64>() / take as f64;
            peak[[k, t]] = sorted[sorted.len() - take..].iter().sum::<f64>() / take as f64;
        }
    }

    power_to_db(&peak) - power_to_db(&valley)
}
