//! pulse.roi_sample.v1 schema
//!
//! Recorded per-frame region samples, replayable through the monitor without
//! video.

mod adapter;
mod sample_record;

pub use adapter::*;
pub use sample_record::*;
