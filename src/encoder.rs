//! Report encoding
//!
//! Wraps published snapshots with producer metadata for transport to a
//! renderer or log sink.

use crate::error::PulseError;
use crate::types::{PulseProducer, PulseReport, PulseSnapshot};
use crate::{PRODUCER_NAME, PULSE_VERSION};
use chrono::Utc;
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Encoder for snapshot reports
pub struct SnapshotEncoder {
    instance_id: String,
}

impl Default for SnapshotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Wrap a snapshot in a report stamped with the current time
    pub fn encode(&self, snapshot: &PulseSnapshot) -> PulseReport {
        PulseReport {
            report_version: REPORT_VERSION.to_string(),
            producer: PulseProducer {
                name: PRODUCER_NAME.to_string(),
                version: PULSE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            snapshot: snapshot.clone(),
        }
    }

    /// Encode to a pretty JSON string
    pub fn encode_to_json(&self, snapshot: &PulseSnapshot) -> Result<String, PulseError> {
        let report = self.encode(snapshot);
        serde_json::to_string_pretty(&report).map_err(|e| PulseError::EncodingError(e.to_string()))
    }

    /// Encode to a single-line JSON string
    pub fn encode_to_line(&self, snapshot: &PulseSnapshot) -> Result<String, PulseError> {
        let report = self.encode(snapshot);
        serde_json::to_string(&report).map_err(|e| PulseError::EncodingError(e.to_string()))
    }
}
