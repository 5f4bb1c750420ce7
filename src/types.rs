//! Core types for the Synheart Pulse pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: face geometry, region definitions, per-frame samples, fusion
//! weights, and the snapshot published to the rendering side.

use serde::{Deserialize, Serialize};

/// Number of sampled skin regions
pub const REGION_COUNT: usize = 3;

/// Face bounding box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Bounding box of normalized (0-1) landmark coordinates scaled to the frame
    pub fn from_landmarks(
        landmarks: &[(f64, f64)],
        frame_width: usize,
        frame_height: usize,
    ) -> Option<Self> {
        let (w, h) = (frame_width as f64, frame_height as f64);
        let mut points = landmarks
            .iter()
            .map(|(lx, ly)| ((lx * w) as i32, (ly * h) as i32));

        let first = points.next()?;
        let (mut x_min, mut y_min, mut x_max, mut y_max) = (first.0, first.1, first.0, first.1);
        for (x, y) in points {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }

        Some(Self::new(
            x_min,
            y_min,
            x_max.saturating_sub(x_min),
            y_max.saturating_sub(y_min),
        ))
    }
}

/// Axis-aligned rectangle, half-open on the right and bottom edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Intersect with a `width` x `height` frame. `None` when nothing remains.
    pub fn clip(&self, width: usize, height: usize) -> Option<Rect> {
        let clipped = Rect {
            x1: self.x1.max(0),
            y1: self.y1.max(0),
            x2: self.x2.min(width.min(i32::MAX as usize) as i32),
            y2: self.y2.min(height.min(i32::MAX as usize) as i32),
        };

        if clipped.width() <= 0 || clipped.height() <= 0 {
            None
        } else {
            Some(clipped)
        }
    }
}

/// Anatomical class of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Forehead,
    Cheek,
}

/// The three sampled regions, in buffer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Forehead,
    LeftCheek,
    RightCheek,
}

impl Region {
    pub const ALL: [Region; REGION_COUNT] = [Region::Forehead, Region::LeftCheek, Region::RightCheek];

    pub fn index(self) -> usize {
        match self {
            Region::Forehead => 0,
            Region::LeftCheek => 1,
            Region::RightCheek => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Region::Forehead => "Forehead",
            Region::LeftCheek => "Left Cheek",
            Region::RightCheek => "Right Cheek",
        }
    }

    pub fn kind(self) -> RegionKind {
        match self {
            Region::Forehead => RegionKind::Forehead,
            Region::LeftCheek | Region::RightCheek => RegionKind::Cheek,
        }
    }

    /// Display color (r, g, b) for the renderer
    pub fn color(self) -> [u8; 3] {
        match self.kind() {
            RegionKind::Forehead => [0, 255, 0],
            RegionKind::Cheek => [0, 0, 255],
        }
    }
}

/// A region of interest placed on the current face box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiDefinition {
    pub region: Region,
    pub rect: Rect,
    /// Static configured fusion weight
    pub weight: f64,
    pub label: String,
    pub kind: RegionKind,
    pub color: [u8; 3],
}

/// One region's contribution for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiSample {
    /// Mean green intensity
    pub intensity: f64,
    /// Pixel dispersion (std / mean) of the skin pixels; `1.0` when no skin was
    /// found and the whole region was averaged; `None` when the region fell
    /// outside the frame and no sample exists.
    pub dispersion: Option<f64>,
}

impl RoiSample {
    /// Placeholder for a region that produced no sample this frame
    pub fn missing() -> Self {
        Self {
            intensity: 0.0,
            dispersion: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.dispersion.is_some()
    }
}

/// Where the current fusion weights came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// Normalized temporal quality scores (sum to 1)
    Quality,
    /// Static configured weights
    Static,
}

/// Fusion weights per region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub weights: [f64; REGION_COUNT],
    pub source: WeightSource,
}

/// Qualitative grade derived from confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl SignalGrade {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 70.0 {
            SignalGrade::Excellent
        } else if confidence > 50.0 {
            SignalGrade::Good
        } else if confidence > 30.0 {
            SignalGrade::Fair
        } else {
            SignalGrade::Poor
        }
    }
}

/// Magnitude spectrum of the last successful estimate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSnapshot {
    pub freqs_hz: Vec<f64>,
    pub magnitudes: Vec<f64>,
}

/// Per-region state published each frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub region: Region,
    pub label: String,
    pub kind: RegionKind,
    pub color: [u8; 3],
    /// Placement on the current face box; `None` on frames without a face
    pub rect: Option<Rect>,
    /// Current fusion weight
    pub weight: Option<f64>,
    /// This frame's sample, when one was taken
    pub sample: Option<RoiSample>,
}

/// Everything the rendering side needs after a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseSnapshot {
    /// Frame timestamp (seconds)
    pub timestamp: f64,
    pub face_detected: bool,
    /// Smoothed heart rate; `None` until the first accepted estimate
    pub current_bpm: Option<f64>,
    /// Confidence 0-100
    pub confidence: f64,
    pub avg_snr_db: f64,
    pub signal_grade: SignalGrade,
    pub weight_source: Option<WeightSource>,
    pub regions: Vec<RegionSnapshot>,
    /// Recent combined samples
    pub raw_waveform: Vec<f64>,
    /// Recent filtered samples from the last successful estimate
    pub filtered_waveform: Vec<f64>,
    pub spectrum: SpectrumSnapshot,
    /// Seconds until the update gate re-opens; `None` before the first update
    pub next_update_in_secs: Option<f64>,
    /// Samples currently held in the window
    pub sample_count: usize,
    /// BPM candidate produced by this frame, before gating and smoothing
    pub candidate_bpm: Option<f64>,
}

/// Producer metadata attached to encoded reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// A snapshot wrapped for transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseReport {
    pub report_version: String,
    pub producer: PulseProducer,
    /// RFC 3339 encoding time
    pub computed_at_utc: String,
    pub snapshot: PulseSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_box_from_landmarks() {
        let landmarks = [(0.25, 0.2), (0.75, 0.8), (0.5, 0.5)];
        let face = FaceBox::from_landmarks(&landmarks, 640, 480).unwrap();
        assert_eq!(face, FaceBox::new(160, 96, 320, 288));
        assert!(FaceBox::from_landmarks(&[], 640, 480).is_none());

        // far-off landmarks saturate instead of wrapping
        let extreme = [(-1e12, -1e12), (1e12, 1e12)];
        let face = FaceBox::from_landmarks(&extreme, 640, 480).unwrap();
        assert_eq!(face.x, i32::MIN);
        assert_eq!(face.width, i32::MAX);
    }

    #[test]
    fn test_rect_clip() {
        let rect = Rect {
            x1: -5,
            y1: -5,
            x2: 10,
            y2: 10,
        };
        assert_eq!(
            rect.clip(8, 20),
            Some(Rect {
                x1: 0,
                y1: 0,
                x2: 8,
                y2: 10
            })
        );

        let outside = Rect {
            x1: 50,
            y1: 0,
            x2: 60,
            y2: 10,
        };
        assert_eq!(outside.clip(40, 40), None);

        let wide = Rect {
            x1: i32::MIN,
            y1: 0,
            x2: i32::MAX,
            y2: 10,
        };
        assert_eq!(wide.width(), i32::MAX);
    }

    #[test]
    fn test_signal_grade_thresholds() {
        assert_eq!(SignalGrade::from_confidence(71.0), SignalGrade::Excellent);
        assert_eq!(SignalGrade::from_confidence(70.0), SignalGrade::Good);
        assert_eq!(SignalGrade::from_confidence(50.5), SignalGrade::Good);
        assert_eq!(SignalGrade::from_confidence(31.0), SignalGrade::Fair);
        assert_eq!(SignalGrade::from_confidence(0.0), SignalGrade::Poor);
    }

    #[test]
    fn test_region_metadata() {
        assert_eq!(Region::ALL.map(Region::index), [0, 1, 2]);
        assert_eq!(Region::LeftCheek.kind(), RegionKind::Cheek);
        assert_eq!(Region::Forehead.label(), "Forehead");
    }
}
