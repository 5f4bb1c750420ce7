//! Error types for Synheart Pulse

use thiserror::Error;

/// Errors that can occur at the boundaries of the pipeline.
///
/// Nothing inside the per-frame path is fatal: numeric failures there degrade
/// to "no estimate for this frame". These variants surface only from frame
/// construction, configuration, record parsing and the raw DSP functions.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Filter design error: {0}")]
    FilterDesign(String),

    #[error("Insufficient samples: need more than {needed}, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    #[error("Invalid sample record: {0}")]
    InvalidRecord(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
