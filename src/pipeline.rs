//! Pipeline orchestration
//!
//! [`PulseMonitor`] owns every piece of per-session state and runs one frame
//! at a time through the stages:
//!
//! 1. Skin-region sampling (`roi`)
//! 2. Buffer append (`buffer`)
//! 3. Quality-adaptive fusion (`fusion`)
//! 4. Window eviction (`buffer`)
//! 5. Filtering and estimation (`dsp`, `estimator`)
//! 6. Gating and smoothing (`smoother`)
//!
//! No stage returns an error from the per-frame path; a frame that cannot
//! contribute simply produces a snapshot without a new candidate.

use crate::buffer::SampleWindow;
use crate::config::PulseConfig;
use crate::error::PulseError;
use crate::estimator::{HeartRateEstimate, HeartRateEstimator, MIN_ESTIMATE_SAMPLES};
use crate::frame::Frame;
use crate::fusion;
use crate::roi::{define_regions, RoiSampler};
use crate::schema::SampleRecord;
use crate::smoother::{BpmSmoother, UpdateGate};
use crate::types::{
    FaceBox, FusionWeights, PulseSnapshot, Region, RegionSnapshot, RoiDefinition, RoiSample,
    SignalGrade, SpectrumSnapshot, REGION_COUNT,
};
use tracing::{debug, trace};

/// Stateful heart-rate monitor for a single subject.
///
/// Feed it frames (or recorded samples) in timestamp order. Timestamps are in
/// seconds on any monotonic clock; the update cadence is measured against
/// them rather than wall time.
#[derive(Debug, Clone)]
pub struct PulseMonitor {
    config: PulseConfig,
    sampler: RoiSampler,
    window: SampleWindow,
    estimator: HeartRateEstimator,
    smoother: BpmSmoother,
    gate: UpdateGate,
    regions: Option<[RoiDefinition; REGION_COUNT]>,
    samples: Option<[RoiSample; REGION_COUNT]>,
    weights: Option<FusionWeights>,
    filtered_display: Vec<f64>,
    spectrum: SpectrumSnapshot,
    last_timestamp: f64,
    face_detected: bool,
    candidate_bpm: Option<f64>,
}

impl Default for PulseMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseMonitor {
    /// Create a monitor with the default configuration
    pub fn new() -> Self {
        Self::build(PulseConfig::default())
    }

    /// Create a monitor with a validated configuration
    pub fn with_config(config: PulseConfig) -> Result<Self, PulseError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PulseConfig) -> Self {
        Self {
            sampler: RoiSampler::new(config.skin),
            window: SampleWindow::new(),
            estimator: HeartRateEstimator::new(&config),
            smoother: BpmSmoother::new(),
            gate: UpdateGate::new(config.update_interval_secs),
            regions: None,
            samples: None,
            weights: None,
            filtered_display: Vec::new(),
            spectrum: SpectrumSnapshot::default(),
            last_timestamp: 0.0,
            face_detected: false,
            candidate_bpm: None,
            config,
        }
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Process one video frame.
    ///
    /// `face` is the face bounding box for this frame, in the coordinates of
    /// the (possibly mirrored) frame that is sampled. Frames without a face are
    /// not sampled and leave every buffer untouched, as do frames with a
    /// non-finite timestamp.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        face: Option<FaceBox>,
        timestamp: f64,
    ) -> PulseSnapshot {
        if !timestamp.is_finite() {
            return self.reject_timestamp(timestamp);
        }
        let Some(face) = face else {
            return self.skip_frame(timestamp);
        };

        let mirrored;
        let frame = if self.config.mirror_input {
            mirrored = frame.mirrored();
            &mirrored
        } else {
            frame
        };

        let regions = define_regions(&face, &self.config.roi_weights);
        let samples = self.sampler.sample_all(frame, &regions);
        self.regions = Some(regions);
        self.ingest(timestamp, samples)
    }

    /// Process one recorded sample record
    pub fn push_samples(&mut self, record: &SampleRecord) -> Result<PulseSnapshot, PulseError> {
        record
            .validate()
            .map_err(|e| PulseError::InvalidRecord(e.to_string()))?;

        if !record.face_detected {
            return Ok(self.skip_frame(record.timestamp));
        }

        self.regions = None;
        Ok(self.ingest(record.timestamp, record.to_roi_samples()))
    }

    /// Process already-extracted region samples for one frame
    pub fn push_roi_samples(
        &mut self,
        timestamp: f64,
        samples: [RoiSample; REGION_COUNT],
    ) -> PulseSnapshot {
        if !timestamp.is_finite() {
            return self.reject_timestamp(timestamp);
        }
        self.regions = None;
        self.ingest(timestamp, samples)
    }

    fn reject_timestamp(&self, timestamp: f64) -> PulseSnapshot {
        debug!(timestamp, "non-finite timestamp, frame dropped");
        self.snapshot()
    }

    fn skip_frame(&mut self, timestamp: f64) -> PulseSnapshot {
        trace!(timestamp, "no face, frame skipped");
        self.last_timestamp = timestamp;
        self.face_detected = false;
        self.regions = None;
        self.samples = None;
        self.candidate_bpm = None;
        self.snapshot()
    }

    fn ingest(&mut self, timestamp: f64, samples: [RoiSample; REGION_COUNT]) -> PulseSnapshot {
        self.last_timestamp = timestamp;
        self.face_detected = true;
        self.candidate_bpm = None;

        for (region, sample) in Region::ALL.iter().zip(&samples) {
            if !sample.is_present() {
                debug!(region = region.label(), timestamp, "region outside frame");
            }
        }

        // missing regions still push a placeholder to keep buffers aligned
        self.window
            .push_samples(timestamp, samples.map(|s| s.intensity));
        let present = samples.map(|s| s.is_present());
        let outcome = fusion::fuse(&self.window, self.config.roi_weights.as_array(), present);
        self.window.push_combined(outcome.combined);
        self.window.evict_older_than(self.config.window_duration_secs);

        self.samples = Some(samples);
        self.weights = Some(outcome.weights);

        if self.window.combined().len() > MIN_ESTIMATE_SAMPLES {
            let fs = self.window.sample_rate();
            let combined: Vec<f64> = self.window.combined().iter().copied().collect();
            if let Some(estimate) = self.estimator.estimate(&combined, fs) {
                self.publish_estimate(&estimate);
                self.candidate_bpm = Some(estimate.bpm);
                self.gate.offer(
                    &mut self.smoother,
                    estimate.bpm,
                    self.estimator.avg_snr(),
                    timestamp,
                );
            }
        }

        self.snapshot()
    }

    fn publish_estimate(&mut self, estimate: &HeartRateEstimate) {
        self.filtered_display = tail(&estimate.filtered, self.config.display_window_samples);
        self.spectrum = SpectrumSnapshot {
            freqs_hz: estimate.freqs_hz.clone(),
            magnitudes: estimate.magnitudes.clone(),
        };
    }

    /// Current published state
    pub fn snapshot(&self) -> PulseSnapshot {
        let confidence = self.smoother.confidence();
        let combined: Vec<f64> = self.window.combined().iter().copied().collect();

        let regions = Region::ALL
            .iter()
            .map(|&region| {
                let i = region.index();
                RegionSnapshot {
                    region,
                    label: region.label().to_string(),
                    kind: region.kind(),
                    color: region.color(),
                    rect: self.regions.as_ref().map(|r| r[i].rect),
                    weight: self.weights.map(|w| w.weights[i]),
                    sample: self.samples.map(|s| s[i]),
                }
            })
            .collect();

        PulseSnapshot {
            timestamp: self.last_timestamp,
            face_detected: self.face_detected,
            current_bpm: self.smoother.current_bpm(),
            confidence,
            avg_snr_db: self.estimator.avg_snr(),
            signal_grade: SignalGrade::from_confidence(confidence),
            weight_source: self.weights.map(|w| w.source),
            regions,
            raw_waveform: tail(&combined, self.config.display_window_samples),
            filtered_waveform: self.filtered_display.clone(),
            spectrum: self.spectrum.clone(),
            next_update_in_secs: self.gate.time_remaining(self.last_timestamp),
            sample_count: self.window.len(),
            candidate_bpm: self.candidate_bpm,
        }
    }

    /// Smoothed heart rate, `None` until the first accepted update
    pub fn current_bpm(&self) -> Option<f64> {
        self.smoother.current_bpm()
    }

    pub fn confidence(&self) -> f64 {
        self.smoother.confidence()
    }

    pub fn avg_snr(&self) -> f64 {
        self.estimator.avg_snr()
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    /// Discard all session state, keeping the configuration
    pub fn reset(&mut self) {
        debug!("monitor reset");
        *self = Self::build(self.config.clone());
    }
}

fn tail(values: &[f64], n: usize) -> Vec<f64> {
    values[values.len().saturating_sub(n)..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelOrder;
    use pretty_assertions::assert_eq;
    use std::f64::consts::PI;

    const SKIN: [u8; 3] = [200, 150, 120];

    fn skin_frame(green: u8) -> Frame {
        Frame::filled(64, 48, ChannelOrder::Bgr, [SKIN[0], green, SKIN[2]])
    }

    fn face() -> Option<FaceBox> {
        Some(FaceBox::new(8, 4, 48, 40))
    }

    fn sine_samples(t: f64, freq: f64) -> [RoiSample; REGION_COUNT] {
        let v = 100.0 + (2.0 * PI * freq * t).sin();
        [RoiSample {
            intensity: v,
            dispersion: Some(0.02),
        }; REGION_COUNT]
    }

    #[test]
    fn test_initial_snapshot() {
        let monitor = PulseMonitor::new();
        let snapshot = monitor.snapshot();

        assert_eq!(snapshot.current_bpm, None);
        assert_eq!(snapshot.confidence, 0.0);
        assert_eq!(snapshot.signal_grade, SignalGrade::Poor);
        assert_eq!(snapshot.next_update_in_secs, None);
        assert_eq!(snapshot.regions.len(), REGION_COUNT);
        assert!(snapshot.raw_waveform.is_empty());
    }

    #[test]
    fn test_with_config_validates() {
        let config = PulseConfig {
            filter_order: 0,
            ..PulseConfig::default()
        };
        assert!(PulseMonitor::with_config(config).is_err());
    }

    #[test]
    fn test_frame_without_face_is_skipped() {
        let mut monitor = PulseMonitor::new();
        monitor.process_frame(&skin_frame(150), face(), 0.0);
        let snapshot = monitor.process_frame(&skin_frame(150), None, 0.033);

        assert!(!snapshot.face_detected);
        assert_eq!(snapshot.sample_count, 1);
        assert!(snapshot.regions.iter().all(|r| r.rect.is_none()));
    }

    #[test]
    fn test_frame_samples_skin_regions() {
        let mut monitor = PulseMonitor::new();
        let snapshot = monitor.process_frame(&skin_frame(150), face(), 0.0);

        assert!(snapshot.face_detected);
        assert_eq!(snapshot.sample_count, 1);
        for region in &snapshot.regions {
            let sample = region.sample.unwrap();
            assert_eq!(sample.intensity, 150.0);
            assert_eq!(sample.dispersion, Some(0.0));
            assert!(region.rect.is_some());
        }
        assert_eq!(snapshot.raw_waveform, vec![150.0]);
    }

    #[test]
    fn test_region_outside_frame_excluded_from_fusion() {
        let mut monitor = PulseMonitor::new();
        // cheeks fall below the bottom edge
        let snapshot = monitor.process_frame(&skin_frame(150), Some(FaceBox::new(8, 40, 48, 40)), 0.0);

        assert!(snapshot.regions[0].sample.unwrap().is_present());
        assert!(!snapshot.regions[1].sample.unwrap().is_present());
        assert_eq!(snapshot.raw_waveform, vec![150.0]);

        let window = monitor.window();
        assert!(window.regions().iter().all(|b| b.len() == window.len()));
    }

    #[test]
    fn test_mirrored_input() {
        let config = PulseConfig {
            mirror_input: true,
            ..PulseConfig::default()
        };
        let mut monitor = PulseMonitor::with_config(config).unwrap();

        // skin only on the right half; mirroring moves it under the left-anchored face box
        let mut frame = Frame::filled(64, 48, ChannelOrder::Bgr, [0, 0, 0]);
        for y in 0..48 {
            for x in 32..64 {
                frame.set_rgb(x, y, SKIN);
            }
        }
        let snapshot = monitor.process_frame(&frame, Some(FaceBox::new(0, 0, 30, 40)), 0.0);
        let sample = snapshot.regions[1].sample.unwrap();
        assert_eq!(sample.intensity, 150.0);
    }

    #[test]
    fn test_window_bounded_and_aligned() {
        let config = PulseConfig {
            window_duration_secs: 2.0,
            ..PulseConfig::default()
        };
        let mut monitor = PulseMonitor::with_config(config).unwrap();
        for i in 0..200 {
            let t = i as f64 / 30.0;
            monitor.push_roi_samples(t, sine_samples(t, 1.0));
        }

        let window = monitor.window();
        assert!(window.span() <= 2.0 + 1.0 / 30.0);
        assert_eq!(window.combined().len(), window.len());
        assert!(window.regions().iter().all(|b| b.len() == window.len()));
    }

    #[test]
    fn test_no_estimate_until_enough_samples() {
        let mut monitor = PulseMonitor::new();
        for i in 0..=MIN_ESTIMATE_SAMPLES {
            let t = i as f64 / 30.0;
            let snapshot = monitor.push_roi_samples(t, sine_samples(t, 1.2));
            if i < MIN_ESTIMATE_SAMPLES {
                assert_eq!(snapshot.candidate_bpm, None);
            }
        }
        assert!(monitor.current_bpm().is_some());
    }

    #[test]
    fn test_first_estimate_then_countdown() {
        let mut monitor = PulseMonitor::new();
        let mut first_update = None;
        for i in 0..120 {
            let t = i as f64 / 30.0;
            let snapshot = monitor.push_roi_samples(t, sine_samples(t, 1.2));
            if first_update.is_none() && snapshot.current_bpm.is_some() {
                first_update = Some((t, snapshot.current_bpm));
                assert_eq!(snapshot.next_update_in_secs, Some(5.0));
            }
        }

        // the interval has not elapsed, so later candidates were ignored
        let (_, bpm) = first_update.unwrap();
        assert_eq!(monitor.current_bpm(), bpm);
    }

    #[test]
    fn test_push_samples_record() {
        let mut monitor = PulseMonitor::new();
        let record = SampleRecord::new(0.5, [Some(100.0), None, Some(102.0)]);
        let snapshot = monitor.push_samples(&record).unwrap();

        assert_eq!(snapshot.sample_count, 1);
        assert!(snapshot.regions.iter().all(|r| r.rect.is_none()));
        assert_eq!(snapshot.weight_source, Some(crate::types::WeightSource::Quality));
        // warm-up weights are equal, so the two present regions average
        assert!((snapshot.raw_waveform[0] - 101.0).abs() < 1e-9);

        let skipped = monitor.push_samples(&SampleRecord::no_face(0.6)).unwrap();
        assert!(!skipped.face_detected);
        assert_eq!(skipped.sample_count, 1);

        let bad = SampleRecord::new(f64::NAN, [None; REGION_COUNT]);
        assert!(monitor.push_samples(&bad).is_err());
    }

    #[test]
    fn test_reset() {
        let mut monitor = PulseMonitor::new();
        for i in 0..60 {
            let t = i as f64 / 30.0;
            monitor.push_roi_samples(t, sine_samples(t, 1.2));
        }
        assert!(monitor.current_bpm().is_some());

        monitor.reset();
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.current_bpm, None);
        assert_eq!(snapshot.sample_count, 0);
        assert_eq!(snapshot.avg_snr_db, 0.0);
        assert!(snapshot.spectrum.freqs_hz.is_empty());
        assert!(snapshot.filtered_waveform.is_empty());
    }

    #[test]
    fn test_one_hertz_pulse_end_to_end() {
        let mut monitor = PulseMonitor::new();
        let mut last = monitor.snapshot();
        for i in 0..60 {
            let t = i as f64 / 30.0;
            last = monitor.push_roi_samples(t, sine_samples(t, 1.0));
        }

        let candidate = last.candidate_bpm.unwrap();
        assert!((candidate - 60.0).abs() <= 5.0, "candidate {candidate}");
        assert!(last.current_bpm.is_some());
        assert!(!last.spectrum.freqs_hz.is_empty());
    }

    #[test]
    fn test_video_frames_track_heart_rate() {
        let config = PulseConfig {
            update_interval_secs: 1.0,
            ..PulseConfig::default()
        };
        let mut monitor = PulseMonitor::with_config(config).unwrap();

        let mut last = monitor.snapshot();
        for i in 0..600 {
            let t = i as f64 / 30.0;
            let green = 150.0 + (2.0 * (2.0 * PI * 1.2 * t).sin()).round();
            last = monitor.process_frame(&skin_frame(green as u8), face(), t);
        }

        let bpm = last.current_bpm.unwrap();
        assert!((bpm - 72.0).abs() <= 5.0, "bpm {bpm}");
        assert!(last.confidence > 0.0);
        assert_eq!(last.filtered_waveform.len(), 100);
        assert_eq!(last.raw_waveform.len(), 100);
    }

    #[test]
    fn test_flat_session_gives_no_estimate() {
        let mut monitor = PulseMonitor::new();
        let mut last = monitor.snapshot();
        for i in 0..120 {
            let t = i as f64 / 30.0;
            last = monitor.process_frame(&skin_frame(150), face(), t);
        }

        assert_eq!(last.sample_count, 120);
        assert_eq!(last.candidate_bpm, None);
        assert_eq!(last.current_bpm, None);
        assert_eq!(last.confidence, 0.0);
        assert_eq!(last.avg_snr_db, 0.0);

        let json = serde_json::to_string(&last).unwrap();
        let restored: PulseSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.confidence, 0.0);
        assert_eq!(restored.sample_count, 120);
    }

    #[test]
    fn test_all_regions_missing_gives_no_estimate() {
        let mut monitor = PulseMonitor::new();
        let mut last = monitor.snapshot();
        for i in 0..120 {
            let t = i as f64 / 30.0;
            last = monitor.push_roi_samples(t, [RoiSample::missing(); REGION_COUNT]);
        }

        assert!(last.raw_waveform.iter().all(|v| *v == 0.0));
        assert_eq!(last.candidate_bpm, None);
        assert_eq!(last.current_bpm, None);
        assert!((0.0..=100.0).contains(&last.confidence));
        assert!(last.avg_snr_db.is_finite());

        let json = serde_json::to_string(&last).unwrap();
        assert!(serde_json::from_str::<PulseSnapshot>(&json).is_ok());
    }

    #[test]
    fn test_pulse_after_flat_stretch() {
        let config = PulseConfig {
            window_duration_secs: 4.0,
            ..PulseConfig::default()
        };
        let mut monitor = PulseMonitor::with_config(config).unwrap();
        for i in 0..60 {
            let t = i as f64 / 30.0;
            monitor.push_roi_samples(t, [RoiSample { intensity: 100.0, dispersion: Some(0.02) }; REGION_COUNT]);
        }
        assert_eq!(monitor.current_bpm(), None);

        let mut last = monitor.snapshot();
        for i in 60..300 {
            let t = i as f64 / 30.0;
            last = monitor.push_roi_samples(t, sine_samples(t, 1.2));
        }
        assert!(last.current_bpm.is_some());
        assert!((0.0..=100.0).contains(&last.confidence));
        assert!(last.avg_snr_db.is_finite());
    }

    #[test]
    fn test_non_finite_timestamp_dropped() {
        let mut monitor = PulseMonitor::new();
        monitor.process_frame(&skin_frame(150), face(), 0.0);

        let snapshot = monitor.process_frame(&skin_frame(150), face(), f64::NAN);
        assert_eq!(snapshot.sample_count, 1);
        assert_eq!(snapshot.timestamp, 0.0);

        for _ in 0..10 {
            monitor.push_roi_samples(f64::INFINITY, sine_samples(0.0, 1.2));
        }
        assert_eq!(monitor.window().len(), 1);
        assert!(monitor.window().span().is_finite());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut monitor = PulseMonitor::new();
        let snapshot = monitor.process_frame(&skin_frame(150), face(), 1.0);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["face_detected"], true);
        assert_eq!(json["signal_grade"], "poor");
        assert_eq!(json["regions"][1]["label"], "Left Cheek");
        assert!(json["current_bpm"].is_null());
    }
}
