//! Synheart Pulse - On-device remote photoplethysmography (rPPG) engine
//!
//! Pulse estimates heart rate from the green-channel color changes of facial
//! skin in a video stream. Each frame runs through a deterministic pipeline:
//! skin-region sampling → quality-adaptive fusion → windowing → bandpass and
//! spectral analysis → heart-rate estimation → gated smoothing.
//!
//! Face detection, camera capture and rendering are left to the caller: feed
//! [`PulseMonitor`] a [`Frame`] plus a [`FaceBox`] per frame and read back a
//! [`PulseSnapshot`].
//!
//! ## Modules
//!
//! - **Sampling**: `frame`, `roi`
//! - **Signal path**: `buffer`, `fusion`, `dsp`, `estimator`, `smoother`
//! - **Integration**: `pipeline`, `schema`, `encoder`, `ffi`

pub mod buffer;
pub mod config;
pub mod dsp;
pub mod encoder;
pub mod error;
pub mod estimator;
pub mod frame;
pub mod fusion;
pub mod pipeline;
pub mod roi;
pub mod schema;
pub mod smoother;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::PulseConfig;
pub use encoder::SnapshotEncoder;
pub use error::PulseError;
pub use frame::{ChannelOrder, Frame};
pub use pipeline::PulseMonitor;
pub use types::{FaceBox, PulseReport, PulseSnapshot, RoiSample, SignalGrade};

// Schema exports
pub use schema::{SampleRecord, SampleRecordAdapter, SCHEMA_VERSION};

/// Pulse version embedded in every report
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "synheart-pulse";
