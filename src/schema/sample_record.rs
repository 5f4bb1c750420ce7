//! pulse.roi_sample.v1 record definition
//!
//! One record per processed frame: the timestamp and the three region
//! intensities, without pixels. Lets a session be captured once and replayed
//! through the monitor later.

use crate::roi::UNTRUSTED_DISPERSION;
use crate::types::{RoiSample, REGION_COUNT};
use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "pulse.roi_sample.v1";

fn default_face_detected() -> bool {
    true
}

/// Per-frame region samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Schema version (always "pulse.roi_sample.v1")
    pub schema_version: String,
    /// Capture time in seconds
    pub timestamp: f64,
    /// Frames without a face carry no samples and are only used for cadence
    #[serde(default = "default_face_detected")]
    pub face_detected: bool,
    /// Mean green intensity per region (forehead, left cheek, right cheek);
    /// `null` for a region that fell outside the frame
    pub intensities: [Option<f64>; REGION_COUNT],
    /// Optional dispersion proxy per region
    #[serde(default, skip_serializing_if = "all_none")]
    pub dispersions: [Option<f64>; REGION_COUNT],
}

fn all_none(values: &[Option<f64>; REGION_COUNT]) -> bool {
    values.iter().all(Option::is_none)
}

impl SampleRecord {
    pub fn new(timestamp: f64, intensities: [Option<f64>; REGION_COUNT]) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp,
            face_detected: true,
            intensities,
            dispersions: [None; REGION_COUNT],
        }
    }

    /// A record for a frame where no face was found
    pub fn no_face(timestamp: f64) -> Self {
        Self {
            face_detected: false,
            ..Self::new(timestamp, [None; REGION_COUNT])
        }
    }

    /// Capture sampler output as a record
    pub fn from_samples(timestamp: f64, samples: &[RoiSample; REGION_COUNT]) -> Self {
        let mut record = Self::new(timestamp, [None; REGION_COUNT]);
        for (i, sample) in samples.iter().enumerate() {
            if sample.is_present() {
                record.intensities[i] = Some(sample.intensity);
                record.dispersions[i] = sample.dispersion;
            }
        }
        record
    }

    /// Region samples for the monitor.
    ///
    /// A present intensity without a recorded dispersion is marked untrusted.
    pub fn to_roi_samples(&self) -> [RoiSample; REGION_COUNT] {
        std::array::from_fn(|i| match self.intensities[i] {
            Some(intensity) => RoiSample {
                intensity,
                dispersion: Some(self.dispersions[i].unwrap_or(UNTRUSTED_DISPERSION)),
            },
            None => RoiSample::missing(),
        })
    }

    /// Validate the record
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        if !self.timestamp.is_finite() || self.timestamp < 0.0 {
            return Err(ValidationError::InvalidTimestamp(self.timestamp));
        }

        for (region, value) in self.intensities.iter().enumerate() {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ValidationError::NonFiniteIntensity { region });
                }
            }
        }

        Ok(())
    }
}

/// Validation errors for sample records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(f64),

    #[error("Non-finite intensity for region {region}")]
    NonFiniteIntensity { region: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_record() {
        let json = r#"{
            "schema_version": "pulse.roi_sample.v1",
            "timestamp": 12.5,
            "intensities": [101.2, null, 99.8]
        }"#;

        let record: SampleRecord = serde_json::from_str(json).unwrap();
        assert!(record.face_detected);
        assert_eq!(record.intensities, [Some(101.2), None, Some(99.8)]);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_serialize_skips_empty_dispersions() {
        let record = SampleRecord::new(1.0, [Some(1.0), Some(2.0), Some(3.0)]);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("dispersions").is_none());
        assert_eq!(json["schema_version"], SCHEMA_VERSION);
    }

    #[test]
    fn test_validation_errors() {
        let mut record = SampleRecord::new(1.0, [Some(1.0), Some(f64::NAN), None]);
        assert_eq!(
            record.validate(),
            Err(ValidationError::NonFiniteIntensity { region: 1 })
        );

        record.intensities[1] = None;
        record.timestamp = -1.0;
        assert_eq!(record.validate(), Err(ValidationError::InvalidTimestamp(-1.0)));

        record.timestamp = 1.0;
        record.schema_version = "wear.raw_event.v1".to_string();
        assert!(matches!(
            record.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_samples_round_through_record() {
        let samples = [
            RoiSample {
                intensity: 120.0,
                dispersion: Some(0.05),
            },
            RoiSample::missing(),
            RoiSample {
                intensity: 118.0,
                dispersion: Some(UNTRUSTED_DISPERSION),
            },
        ];

        let record = SampleRecord::from_samples(3.0, &samples);
        assert_eq!(record.intensities, [Some(120.0), None, Some(118.0)]);
        assert_eq!(record.to_roi_samples(), samples);
    }

    #[test]
    fn test_missing_dispersion_is_untrusted() {
        let record = SampleRecord::new(0.0, [Some(5.0), None, None]);
        let samples = record.to_roi_samples();
        assert_eq!(samples[0].dispersion, Some(UNTRUSTED_DISPERSION));
        assert!(!samples[1].is_present());
    }
}
