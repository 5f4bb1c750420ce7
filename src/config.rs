//! Pipeline configuration
//!
//! Static settings loaded once at session start. Defaults match the tuning the
//! three-region monitor shipped with; every field can be overridden from JSON.

use crate::error::PulseError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default sliding-window duration in seconds
pub const DEFAULT_WINDOW_DURATION_SECS: f64 = 15.0;

/// Default minimum interval between accepted BPM updates in seconds
pub const DEFAULT_UPDATE_INTERVAL_SECS: f64 = 5.0;

/// Static fusion weights for the three regions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiWeights {
    pub forehead: f64,
    pub left_cheek: f64,
    pub right_cheek: f64,
}

impl Default for RoiWeights {
    fn default() -> Self {
        Self {
            forehead: 0.4,
            left_cheek: 0.3,
            right_cheek: 0.3,
        }
    }
}

impl RoiWeights {
    /// Weights in region order (forehead, left cheek, right cheek)
    pub fn as_array(&self) -> [f64; 3] {
        [self.forehead, self.left_cheek, self.right_cheek]
    }
}

/// Skin-color thresholds for the two color-space tests.
///
/// Bounds are inclusive, 8-bit, channel order (Y, Cr, Cb) and (H, S, V) with
/// hue in 0-179.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinThresholds {
    pub ycrcb_lower: [u8; 3],
    pub ycrcb_upper: [u8; 3],
    pub hsv_lower: [u8; 3],
    pub hsv_upper: [u8; 3],
}

impl Default for SkinThresholds {
    fn default() -> Self {
        Self {
            ycrcb_lower: [0, 133, 77],
            ycrcb_upper: [255, 173, 127],
            hsv_lower: [0, 30, 60],
            hsv_upper: [25, 150, 255],
        }
    }
}

/// Camera settings. Consumed by the acquisition loop only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 60,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Sliding window duration (seconds)
    pub window_duration_secs: f64,
    /// Minimum interval between accepted updates (seconds)
    pub update_interval_secs: f64,
    /// Bandpass low cutoff (Hz)
    pub bandpass_low_hz: f64,
    /// Bandpass high cutoff (Hz)
    pub bandpass_high_hz: f64,
    /// Butterworth filter order
    pub filter_order: usize,
    /// Static region weights, used while quality scores are unavailable
    pub roi_weights: RoiWeights,
    /// Skin detection thresholds
    pub skin: SkinThresholds,
    /// Camera settings for the acquisition collaborator
    pub camera: CameraSettings,
    /// Flip frames horizontally before sampling
    pub mirror_input: bool,
    /// Number of waveform samples published for display
    pub display_window_samples: usize,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            window_duration_secs: DEFAULT_WINDOW_DURATION_SECS,
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            bandpass_low_hz: 0.8,
            bandpass_high_hz: 3.5,
            filter_order: 4,
            roi_weights: RoiWeights::default(),
            skin: SkinThresholds::default(),
            camera: CameraSettings::default(),
            mirror_input: false,
            display_window_samples: 100,
        }
    }
}

impl PulseConfig {
    /// Parse and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, PulseError> {
        let config: PulseConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn from_path(path: &Path) -> Result<Self, PulseError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PulseError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, PulseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<(), PulseError> {
        if !(self.window_duration_secs.is_finite() && self.window_duration_secs > 0.0) {
            return Err(PulseError::InvalidConfig(format!(
                "window_duration_secs must be positive, got {}",
                self.window_duration_secs
            )));
        }
        if !(self.update_interval_secs.is_finite() && self.update_interval_secs >= 0.0) {
            return Err(PulseError::InvalidConfig(format!(
                "update_interval_secs must be non-negative, got {}",
                self.update_interval_secs
            )));
        }
        if !(self.bandpass_low_hz > 0.0 && self.bandpass_low_hz < self.bandpass_high_hz) {
            return Err(PulseError::InvalidConfig(format!(
                "bandpass band must satisfy 0 < low < high, got [{}, {}]",
                self.bandpass_low_hz, self.bandpass_high_hz
            )));
        }
        if self.filter_order == 0 {
            return Err(PulseError::InvalidConfig(
                "filter_order must be at least 1".to_string(),
            ));
        }
        if self
            .roi_weights
            .as_array()
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(PulseError::InvalidConfig(
                "roi_weights must be finite and non-negative".to_string(),
            ));
        }

        let pairs = [
            ("ycrcb", self.skin.ycrcb_lower, self.skin.ycrcb_upper),
            ("hsv", self.skin.hsv_lower, self.skin.hsv_upper),
        ];
        for (name, lower, upper) in pairs {
            if lower.iter().zip(upper.iter()).any(|(lo, hi)| lo > hi) {
                return Err(PulseError::InvalidConfig(format!(
                    "{name} lower bound exceeds upper bound"
                )));
            }
        }

        Ok(())
    }
}
