//! Quality-adaptive fusion
//!
//! Each region's recent history is scored for temporal quality (spectral SNR
//! plus sample-to-sample stability), the scores are normalized into fusion
//! weights, and the latest samples are blended into one combined value.
//!
//! This score is independent of the per-sample dispersion the sampler reports;
//! dispersion never feeds the weights.

use crate::buffer::SampleWindow;
use crate::dsp::{compute_snr, std_dev, EPSILON};
use crate::types::{FusionWeights, WeightSource, REGION_COUNT};
use std::collections::VecDeque;
use tracing::trace;

/// Timestamps needed before qualities are scored
pub const MIN_SCORING_SAMPLES: usize = 10;

/// Quality assigned to every region while the window warms up
pub const WARMUP_QUALITY: f64 = 0.5;

/// Lower clamp of the quality score; also used for too-short buffers
pub const MIN_QUALITY: f64 = 0.1;

pub const MAX_QUALITY: f64 = 1.0;

const SNR_WEIGHT: f64 = 0.7;
const STABILITY_WEIGHT: f64 = 0.3;

/// Result of fusing one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOutcome {
    pub qualities: [f64; REGION_COUNT],
    pub weights: FusionWeights,
    /// Weighted mean of the latest region samples
    pub combined: f64,
}

/// Temporal quality of one region's intensity history, in `[0.1, 1.0]`
pub fn temporal_quality(buffer: &VecDeque<f64>, fs: f64) -> f64 {
    if buffer.len() < MIN_SCORING_SAMPLES {
        return MIN_QUALITY;
    }

    let samples: Vec<f64> = buffer.iter().copied().collect();
    // a flat history carries no pulse
    if std_dev(&samples) <= EPSILON {
        return MIN_QUALITY;
    }
    let snr = compute_snr(&samples, fs);

    let diffs: Vec<f64> = samples.windows(2).map(|w| w[1] - w[0]).collect();
    let stability = (1.0 / (std_dev(&diffs) + EPSILON) / 100.0).min(1.0);

    let quality = SNR_WEIGHT * (snr / 10.0).min(1.0) + STABILITY_WEIGHT * stability;
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

/// Score every region of the window
pub fn region_qualities(window: &SampleWindow) -> [f64; REGION_COUNT] {
    if window.len() < MIN_SCORING_SAMPLES {
        return [WARMUP_QUALITY; REGION_COUNT];
    }

    let fs = window.sample_rate();
    let mut qualities = [MIN_QUALITY; REGION_COUNT];
    for (quality, buffer) in qualities.iter_mut().zip(window.regions()) {
        *quality = temporal_quality(buffer, fs);
    }
    qualities
}

/// Normalize qualities into weights, falling back to the static weights when
/// the qualities sum to zero
pub fn fusion_weights(
    qualities: [f64; REGION_COUNT],
    static_weights: [f64; REGION_COUNT],
) -> FusionWeights {
    let total: f64 = qualities.iter().sum();
    if total > 0.0 {
        FusionWeights {
            weights: qualities.map(|q| q / total),
            source: WeightSource::Quality,
        }
    } else {
        FusionWeights {
            weights: static_weights,
            source: WeightSource::Static,
        }
    }
}

/// Weighted mean of the newest sample of each contributing region.
///
/// Regions flagged absent in `present` or with empty buffers are left out of
/// both numerator and denominator. Returns 0 when no weight was used.
pub fn combine(
    window: &SampleWindow,
    weights: &FusionWeights,
    present: [bool; REGION_COUNT],
) -> f64 {
    let mut weighted_sum = 0.0;
    let mut used_weight = 0.0;

    for (i, buffer) in window.regions().iter().enumerate() {
        if !present[i] {
            continue;
        }
        if let Some(latest) = buffer.back() {
            weighted_sum += latest * weights.weights[i];
            used_weight += weights.weights[i];
        }
    }

    if used_weight > 0.0 {
        weighted_sum / used_weight
    } else {
        0.0
    }
}

/// Score, weight and blend the newest frame of the window
pub fn fuse(
    window: &SampleWindow,
    static_weights: [f64; REGION_COUNT],
    present: [bool; REGION_COUNT],
) -> FusionOutcome {
    let qualities = region_qualities(window);
    let weights = fusion_weights(qualities, static_weights);
    let combined = combine(window, &weights, present);

    trace!(
        ?qualities,
        weights = ?weights.weights,
        source = ?weights.source,
        combined,
        "fused frame"
    );

    FusionOutcome {
        qualities,
        weights,
        combined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::f64::consts::PI;

    const STATIC: [f64; REGION_COUNT] = [0.4, 0.3, 0.3];

    /// Deterministic pseudo-random values in [-1, 1)
    fn noise(seed: &mut u64) -> f64 {
        *seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((*seed >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }

    fn window_with(n: usize, fs: f64, region: impl Fn(usize, usize) -> f64) -> SampleWindow {
        let mut window = SampleWindow::new();
        for i in 0..n {
            window.push_samples(i as f64 / fs, [region(0, i), region(1, i), region(2, i)]);
            window.push_combined(0.0);
        }
        window
    }

    #[test]
    fn test_warmup_uses_default_quality() {
        let window = window_with(9, 30.0, |_, i| i as f64);
        assert_eq!(region_qualities(&window), [WARMUP_QUALITY; REGION_COUNT]);

        let outcome = fuse(&window, STATIC, [true; REGION_COUNT]);
        assert_eq!(outcome.weights.source, WeightSource::Quality);
        for w in outcome.weights.weights {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_short_buffer_quality() {
        let buffer: VecDeque<f64> = (0..9).map(|i| i as f64).collect();
        assert_eq!(temporal_quality(&buffer, 30.0), MIN_QUALITY);
    }

    #[test]
    fn test_flat_buffer_quality() {
        let flat: VecDeque<f64> = vec![150.0; 60].into();
        assert_eq!(temporal_quality(&flat, 30.0), MIN_QUALITY);

        let missing: VecDeque<f64> = vec![0.0; 60].into();
        assert_eq!(temporal_quality(&missing, 30.0), MIN_QUALITY);
    }

    #[test]
    fn test_quality_is_clamped() {
        let fs = 30.0;
        let mut seed = 7u64;
        let noisy: Vec<f64> = (0..600).map(|_| 100.0 + 50.0 * noise(&mut seed)).collect();
        let window = window_with(300, fs, |r, i| match r {
            0 => 100.0 + (2.0 * PI * 1.2 * i as f64 / fs).sin(),
            _ => noisy[(r - 1) * 300 + i],
        });

        for q in region_qualities(&window) {
            assert!((MIN_QUALITY..=MAX_QUALITY).contains(&q), "quality {q}");
        }
    }

    #[test]
    fn test_clean_region_outranks_noisy_region() {
        let fs = 30.0;
        let mut seed = 42u64;
        let noisy: Vec<f64> = (0..300).map(|_| 100.0 + 40.0 * noise(&mut seed)).collect();
        let window = window_with(300, fs, |r, i| {
            if r == 0 {
                120.0 + (2.0 * PI * 1.2 * i as f64 / fs).sin()
            } else {
                noisy[i]
            }
        });

        let qualities = region_qualities(&window);
        assert!(qualities[0] > 0.6, "clean quality {}", qualities[0]);
        assert!(qualities[1] < 0.2, "noisy quality {}", qualities[1]);
        assert!(qualities[0] > qualities[1]);
    }

    #[test]
    fn test_quality_weights_sum_to_one() {
        let weights = fusion_weights([0.9, 0.1, 0.35], STATIC);
        assert_eq!(weights.source, WeightSource::Quality);
        let total: f64 = weights.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_quality_falls_back_to_static() {
        let weights = fusion_weights([0.0; REGION_COUNT], STATIC);
        assert_eq!(
            weights,
            FusionWeights {
                weights: STATIC,
                source: WeightSource::Static,
            }
        );
    }

    #[test]
    fn test_combine_excludes_absent_regions() {
        let mut window = SampleWindow::new();
        window.push_samples(0.0, [10.0, 20.0, 0.0]);
        let weights = FusionWeights {
            weights: [0.5, 0.25, 0.25],
            source: WeightSource::Quality,
        };

        let combined = combine(&window, &weights, [true, true, false]);
        // (10 * 0.5 + 20 * 0.25) / 0.75
        assert!((combined - 40.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_combine_without_weight_is_zero() {
        let mut window = SampleWindow::new();
        window.push_samples(0.0, [10.0, 20.0, 30.0]);
        let weights = fusion_weights([0.0; REGION_COUNT], [0.0; REGION_COUNT]);

        assert_eq!(combine(&window, &weights, [true; REGION_COUNT]), 0.0);
        assert_eq!(combine(&SampleWindow::new(), &weights, [true; REGION_COUNT]), 0.0);
    }
}
