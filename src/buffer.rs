//! Sliding sample window
//!
//! Holds the shared timestamp sequence, one intensity buffer per region and
//! the fused buffer, all index-aligned. The window is bounded by duration
//! rather than count, so a jittery frame rate changes how many samples it
//! holds but never how much time it spans.

use crate::types::REGION_COUNT;
use std::collections::VecDeque;

/// Frame rate assumed when the window spans no time yet
pub const FALLBACK_SAMPLE_RATE: f64 = 30.0;

/// Aligned per-frame histories
#[derive(Debug, Clone, Default)]
pub struct SampleWindow {
    timestamps: VecDeque<f64>,
    regions: [VecDeque<f64>; REGION_COUNT],
    combined: VecDeque<f64>,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame's timestamp and per-region intensities
    pub fn push_samples(&mut self, timestamp: f64, intensities: [f64; REGION_COUNT]) {
        self.timestamps.push_back(timestamp);
        for (buffer, value) in self.regions.iter_mut().zip(intensities) {
            buffer.push_back(value);
        }
    }

    /// Append the fused sample for the most recent frame
    pub fn push_combined(&mut self, value: f64) {
        self.combined.push_back(value);
    }

    /// Drop samples from the front until the window spans at most `duration_secs`.
    ///
    /// Returns the number of frames evicted.
    pub fn evict_older_than(&mut self, duration_secs: f64) -> usize {
        let mut evicted = 0;
        while self.timestamps.len() > 1 && self.span() > duration_secs {
            self.timestamps.pop_front();
            for buffer in self.regions.iter_mut() {
                buffer.pop_front();
            }
            self.combined.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Newest minus oldest timestamp, 0 when fewer than two samples
    pub fn span(&self) -> f64 {
        match (self.timestamps.front(), self.timestamps.back()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Sample count divided by the span, falling back to 30 Hz
    pub fn sample_rate(&self) -> f64 {
        let span = self.span();
        if span > 0.0 {
            self.timestamps.len() as f64 / span
        } else {
            FALLBACK_SAMPLE_RATE
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &VecDeque<f64> {
        &self.timestamps
    }

    pub fn region(&self, index: usize) -> &VecDeque<f64> {
        &self.regions[index]
    }

    pub fn regions(&self) -> &[VecDeque<f64>; REGION_COUNT] {
        &self.regions
    }

    pub fn combined(&self) -> &VecDeque<f64> {
        &self.combined
    }

    /// Discard all history
    pub fn clear(&mut self) {
        self.timestamps.clear();
        for buffer in self.regions.iter_mut() {
            buffer.clear();
        }
        self.combined.clear();
    }
}
