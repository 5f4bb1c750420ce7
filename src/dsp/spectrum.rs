//! Magnitude spectra and band SNR

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use super::filter::EPSILON;

/// Heart-rate band used for the SNR numerator (Hz, inclusive)
pub const SNR_SIGNAL_BAND: (f64, f64) = (0.7, 4.0);

/// Low noise band, `[0.1, 0.7)` Hz
pub const SNR_LOW_NOISE_BAND: (f64, f64) = (0.1, 0.7);

/// High noise band, `(4.0, 8.0]` Hz
pub const SNR_HIGH_NOISE_BAND: (f64, f64) = (4.0, 8.0);

/// Below this many samples the SNR is reported as 0 dB
pub const MIN_SNR_SAMPLES: usize = 10;

/// Magnitude of every DFT bin of a real sequence
pub fn magnitude_spectrum(seq: &[f64]) -> Vec<f64> {
    if seq.is_empty() {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(seq.len());
    let mut buffer: Vec<Complex64> = seq.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    fft.process(&mut buffer);

    buffer.iter().map(|c| c.norm()).collect()
}

/// Center frequency of each DFT bin; bins past the midpoint are negative
pub fn bin_frequencies(n: usize, fs: f64) -> Vec<f64> {
    let n_f = n as f64;
    (0..n)
        .map(|k| {
            let signed = if k < n.div_ceil(2) {
                k as f64
            } else {
                k as f64 - n_f
            };
            signed * fs / n_f
        })
        .collect()
}

/// Non-negative half of the spectrum: the first `n / 2` bins
pub fn one_sided_spectrum(seq: &[f64], fs: f64) -> (Vec<f64>, Vec<f64>) {
    let half = seq.len() / 2;
    let mut freqs = bin_frequencies(seq.len(), fs);
    let mut mags = magnitude_spectrum(seq);
    freqs.truncate(half);
    mags.truncate(half);
    (freqs, mags)
}

/// Ratio of heart-rate-band power to flanking noise-band power, in dB
pub fn compute_snr(seq: &[f64], fs: f64) -> f64 {
    if seq.len() < MIN_SNR_SAMPLES {
        return 0.0;
    }

    let freqs = bin_frequencies(seq.len(), fs);
    let mags = magnitude_spectrum(seq);

    let mut signal_bins = 0usize;
    let mut signal_power = 0.0;
    let mut noise_power = 0.0;
    for (f, m) in freqs.iter().zip(&mags) {
        let power = m * m;
        if *f >= SNR_SIGNAL_BAND.0 && *f <= SNR_SIGNAL_BAND.1 {
            signal_bins += 1;
            signal_power += power;
        } else if (*f >= SNR_LOW_NOISE_BAND.0 && *f < SNR_LOW_NOISE_BAND.1)
            || (*f > SNR_HIGH_NOISE_BAND.0 && *f <= SNR_HIGH_NOISE_BAND.1)
        {
            noise_power += power;
        }
    }

    if signal_bins == 0 || signal_power <= 0.0 {
        return 0.0;
    }

    10.0 * (signal_power / (noise_power + EPSILON)).log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_bin_frequencies_match_fft_layout() {
        assert_eq!(bin_frequencies(4, 4.0), vec![0.0, 1.0, -2.0, -1.0]);
        assert_eq!(bin_frequencies(5, 5.0), vec![0.0, 1.0, 2.0, -2.0, -1.0]);
    }

    #[test]
    fn test_magnitude_of_pure_tone() {
        let fs = 32.0;
        let mags = magnitude_spectrum(&sine(4.0, fs, 32));
        // bin 4 carries n/2 for a unit sine
        assert!((mags[4] - 16.0).abs() < 1e-9);
        assert!(mags[3].abs() < 1e-9);
    }

    #[test]
    fn test_one_sided_spectrum_length() {
        let (freqs, mags) = one_sided_spectrum(&sine(1.0, 30.0, 61), 30.0);
        assert_eq!(freqs.len(), 30);
        assert_eq!(mags.len(), 30);
        assert!(freqs.iter().all(|f| *f >= 0.0));
    }

    #[test]
    fn test_snr_in_band_tone_is_high() {
        let fs = 30.0;
        let snr = compute_snr(&sine(1.5, fs, 300), fs);
        assert!(snr > 20.0, "snr {snr}");
    }

    #[test]
    fn test_snr_noise_band_tone_is_low() {
        let fs = 30.0;
        let snr = compute_snr(&sine(6.0, fs, 300), fs);
        assert!(snr < -20.0, "snr {snr}");
    }

    #[test]
    fn test_snr_short_input() {
        assert_eq!(compute_snr(&[1.0; 9], 30.0), 0.0);
    }

    #[test]
    fn test_snr_constant_input_is_finite() {
        let snr = compute_snr(&[3.0; 64], 30.0);
        assert!(snr.is_finite());
    }

    #[test]
    fn test_snr_silent_input_is_zero() {
        assert_eq!(compute_snr(&[0.0; 64], 30.0), 0.0);
    }
}
