//! Heart-rate estimation from the combined waveform
//!
//! The combined buffer is normalized and band-limited, then read two ways: the
//! dominant spectral bin inside the heart-rate band, and the mean spacing of
//! waveform peaks. The peak reading is only trusted when recent SNR is good.

use crate::config::PulseConfig;
use crate::dsp::{
    bandpass, compute_snr, find_peaks, normalize, one_sided_spectrum, std_dev, EPSILON,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// The combined buffer must hold more than this many samples
pub const MIN_ESTIMATE_SAMPLES: usize = 45;

/// Capacity of the SNR ring
pub const SNR_HISTORY_LEN: usize = 5;

/// Spectral bins searched for the dominant frequency (Hz, inclusive)
pub const HEART_RATE_BAND_HZ: (f64, f64) = (0.8, 3.5);

/// Average SNR (dB) above which the peak reading joins the spectral one
pub const PEAK_FUSION_SNR_DB: f64 = 3.0;

/// Peaks must be at least `fs / PEAK_SPACING_DIVISOR` samples apart
const PEAK_SPACING_DIVISOR: f64 = 2.5;

/// Peaks must reach this fraction of the signal's standard deviation
const PEAK_HEIGHT_FRACTION: f64 = 0.5;

/// Outcome of the peak-interval reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PeakAnalysis {
    PeaksFound { bpm: f64, count: usize },
    PeaksNotFound,
}

/// One heart-rate reading and the signals it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateEstimate {
    /// Fused BPM candidate
    pub bpm: f64,
    pub fft_bpm: f64,
    pub peaks: PeakAnalysis,
    /// SNR of the filtered signal (dB)
    pub snr_db: f64,
    pub filtered: Vec<f64>,
    /// One-sided frequency axis
    pub freqs_hz: Vec<f64>,
    pub magnitudes: Vec<f64>,
}

/// Spectral plus peak-interval heart-rate estimator with an SNR history
#[derive(Debug, Clone)]
pub struct HeartRateEstimator {
    low_hz: f64,
    high_hz: f64,
    order: usize,
    snr_history: VecDeque<f64>,
}

impl Default for HeartRateEstimator {
    fn default() -> Self {
        Self::new(&PulseConfig::default())
    }
}

impl HeartRateEstimator {
    pub fn new(config: &PulseConfig) -> Self {
        Self {
            low_hz: config.bandpass_low_hz,
            high_hz: config.bandpass_high_hz,
            order: config.filter_order,
            snr_history: VecDeque::with_capacity(SNR_HISTORY_LEN + 1),
        }
    }

    /// Mean of the SNR ring, 0 when empty
    pub fn avg_snr(&self) -> f64 {
        if self.snr_history.is_empty() {
            0.0
        } else {
            self.snr_history.iter().sum::<f64>() / self.snr_history.len() as f64
        }
    }

    pub fn snr_history(&self) -> &VecDeque<f64> {
        &self.snr_history
    }

    pub fn reset(&mut self) {
        self.snr_history.clear();
    }

    /// Estimate BPM from the combined waveform sampled at `fs`.
    ///
    /// Returns `None` when the buffer is too short for filtering, the
    /// waveform carries no energy, or no spectral bin falls inside the
    /// heart-rate band. A flat waveform leaves the SNR ring untouched.
    pub fn estimate(&mut self, combined: &[f64], fs: f64) -> Option<HeartRateEstimate> {
        if combined.len() <= MIN_ESTIMATE_SAMPLES {
            return None;
        }
        if std_dev(combined) <= EPSILON {
            debug!(samples = combined.len(), "flat waveform, no estimate");
            return None;
        }

        let normalized = normalize(combined);
        let filtered = match bandpass(&normalized, self.low_hz, self.high_hz, fs, self.order) {
            Ok(filtered) => filtered,
            Err(err) => {
                debug!(%err, samples = combined.len(), fs, "bandpass failed, no estimate");
                return None;
            }
        };

        if filtered.iter().all(|v| v.abs() <= EPSILON) {
            debug!(samples = filtered.len(), fs, "no in-band energy, no estimate");
            return None;
        }

        let snr_db = compute_snr(&filtered, fs);
        self.push_snr(snr_db);

        let (freqs_hz, magnitudes) = one_sided_spectrum(&filtered, fs);
        let Some(fft_bpm) = dominant_bpm(&freqs_hz, &magnitudes) else {
            debug!(fs, samples = filtered.len(), "no spectral bin in heart-rate band");
            return None;
        };

        let peaks = analyze_peaks(&filtered, fs);
        let avg_snr = self.avg_snr();
        let bpm = match peaks {
            PeakAnalysis::PeaksFound { bpm: peak_bpm, .. } if avg_snr > PEAK_FUSION_SNR_DB => {
                (fft_bpm + peak_bpm) / 2.0
            }
            _ => fft_bpm,
        };

        trace!(bpm, fft_bpm, ?peaks, snr_db, avg_snr, "heart-rate estimate");

        Some(HeartRateEstimate {
            bpm,
            fft_bpm,
            peaks,
            snr_db,
            filtered,
            freqs_hz,
            magnitudes,
        })
    }

    fn push_snr(&mut self, snr_db: f64) {
        self.snr_history.push_back(snr_db);
        while self.snr_history.len() > SNR_HISTORY_LEN {
            self.snr_history.pop_front();
        }
    }
}

/// Frequency of the strongest bin in the heart-rate band, in BPM
fn dominant_bpm(freqs_hz: &[f64], magnitudes: &[f64]) -> Option<f64> {
    let (low, high) = HEART_RATE_BAND_HZ;
    freqs_hz
        .iter()
        .zip(magnitudes)
        .filter(|(f, _)| **f >= low && **f <= high)
        // first maximum wins on ties
        .fold(None, |best: Option<(f64, f64)>, (&f, &m)| match best {
            Some((_, best_m)) if best_m >= m => best,
            _ => Some((f, m)),
        })
        .map(|(f, _)| f * 60.0)
}

/// Heart rate from the mean spacing of peaks in the filtered waveform
pub fn analyze_peaks(filtered: &[f64], fs: f64) -> PeakAnalysis {
    let spacing = fs / PEAK_SPACING_DIVISOR;
    if !spacing.is_finite() || spacing < 1.0 {
        return PeakAnalysis::PeaksNotFound;
    }

    let height = std_dev(filtered) * PEAK_HEIGHT_FRACTION;
    let peaks = find_peaks(filtered, spacing.ceil() as usize, height);
    if peaks.len() < 2 {
        return PeakAnalysis::PeaksNotFound;
    }

    let mean_interval = (peaks[peaks.len() - 1] - peaks[0]) as f64 / (peaks.len() - 1) as f64 / fs;
    PeakAnalysis::PeaksFound {
        bpm: 60.0 / mean_interval,
        count: peaks.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::f64::consts::PI;

    fn pulse(bpm: f64, fs: f64, n: usize) -> Vec<f64> {
        let freq = bpm / 60.0;
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                // 0.2 Hz drift and 9 Hz flicker sit outside the band
                100.0
                    + (2.0 * PI * freq * t).sin()
                    + 0.8 * (2.0 * PI * 0.2 * t).sin()
                    + 0.5 * (2.0 * PI * 9.0 * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_too_short_gives_no_estimate() {
        let mut estimator = HeartRateEstimator::default();
        assert!(estimator.estimate(&pulse(72.0, 30.0, 45), 30.0).is_none());
        assert!(estimator.snr_history().is_empty());
    }

    #[test]
    fn test_72_bpm_with_out_of_band_noise() {
        let mut estimator = HeartRateEstimator::default();
        let estimate = estimator.estimate(&pulse(72.0, 30.0, 300), 30.0).unwrap();

        assert!((estimate.fft_bpm - 72.0).abs() <= 5.0, "fft {}", estimate.fft_bpm);
        assert!((estimate.bpm - 72.0).abs() <= 5.0, "bpm {}", estimate.bpm);
        assert_eq!(estimate.filtered.len(), 300);
        assert_eq!(estimate.freqs_hz.len(), 150);
        assert!(estimate.snr_db > 3.0);
    }

    #[test]
    fn test_peaks_join_when_snr_is_high() {
        let mut estimator = HeartRateEstimator::default();
        let estimate = estimator.estimate(&pulse(72.0, 30.0, 300), 30.0).unwrap();

        match estimate.peaks {
            PeakAnalysis::PeaksFound { bpm, count } => {
                assert!(count >= 10);
                assert!((bpm - 72.0).abs() < 3.0);
                assert!((estimate.bpm - (estimate.fft_bpm + bpm) / 2.0).abs() < 1e-9);
            }
            PeakAnalysis::PeaksNotFound => panic!("expected peaks"),
        }
    }

    #[test]
    fn test_snr_ring_is_bounded() {
        let mut estimator = HeartRateEstimator::default();
        let signal = pulse(60.0, 30.0, 200);
        for _ in 0..8 {
            estimator.estimate(&signal, 30.0);
        }
        assert_eq!(estimator.snr_history().len(), SNR_HISTORY_LEN);

        estimator.reset();
        assert_eq!(estimator.avg_snr(), 0.0);
    }

    #[test]
    fn test_flat_waveform_gives_no_estimate() {
        let mut estimator = HeartRateEstimator::default();
        assert!(estimator.estimate(&[150.0; 120], 30.0).is_none());
        assert!(estimator.estimate(&[0.0; 120], 30.0).is_none());
        assert!(estimator.snr_history().is_empty());
        assert_eq!(estimator.avg_snr(), 0.0);
    }

    #[test]
    fn test_filter_failure_is_not_an_error() {
        let mut estimator = HeartRateEstimator::default();
        // 5 Hz sampling puts the 3.5 Hz edge above Nyquist
        assert!(estimator.estimate(&pulse(72.0, 5.0, 100), 5.0).is_none());
    }

    #[test]
    fn test_peak_analysis_low_rate() {
        // spacing below one sample
        assert_eq!(analyze_peaks(&[0.0, 1.0, 0.0, 1.0, 0.0], 2.0), PeakAnalysis::PeaksNotFound);
        assert_eq!(analyze_peaks(&[0.0; 50], 30.0), PeakAnalysis::PeaksNotFound);
    }

    #[test]
    fn test_dominant_bpm_band() {
        let freqs = [0.0, 0.5, 1.0, 2.0, 4.0];
        let mags = [100.0, 50.0, 3.0, 7.0, 90.0];
        assert_eq!(dominant_bpm(&freqs, &mags), Some(120.0));
        assert_eq!(dominant_bpm(&[0.0, 0.5], &[1.0, 2.0]), None);
    }
}
