//! BPM smoothing and update cadence
//!
//! Accepted candidates go into a short ring whose median is the published
//! heart rate. The [`UpdateGate`] decides which candidates are offered to the
//! ring: the first one immediately, later ones only once the minimum interval
//! has elapsed, and then only when recent SNR is good enough. A rejected
//! candidate at an open gate costs confidence instead.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Capacity of the BPM ring
pub const BPM_HISTORY_LEN: usize = 12;

/// Physiological plausibility range (inclusive)
pub const MIN_PLAUSIBLE_BPM: f64 = 40.0;
pub const MAX_PLAUSIBLE_BPM: f64 = 180.0;

/// Confidence points per dB of average SNR
const CONFIDENCE_PER_SNR_DB: f64 = 20.0;
pub const MAX_CONFIDENCE: f64 = 100.0;

/// Average SNR (dB) a later candidate needs to be accepted
pub const UPDATE_SNR_THRESHOLD_DB: f64 = 2.0;

/// Confidence lost when the gate rejects a candidate
pub const CONFIDENCE_DECAY: f64 = 10.0;

/// Median-smoothed heart rate and its confidence
#[derive(Debug, Clone, Default)]
pub struct BpmSmoother {
    history: VecDeque<f64>,
    current_bpm: Option<f64>,
    confidence: f64,
}

impl BpmSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a candidate into the ring if it is plausible.
    ///
    /// Returns whether it was taken. Implausible values leave BPM and
    /// confidence untouched.
    pub fn accept_candidate(&mut self, bpm: f64, avg_snr: f64) -> bool {
        if !(MIN_PLAUSIBLE_BPM..=MAX_PLAUSIBLE_BPM).contains(&bpm) {
            debug!(bpm, "discarding implausible candidate");
            return false;
        }

        self.history.push_back(bpm);
        while self.history.len() > BPM_HISTORY_LEN {
            self.history.pop_front();
        }

        self.current_bpm = median(&self.history);
        self.confidence = if avg_snr.is_nan() {
            0.0
        } else {
            (avg_snr * CONFIDENCE_PER_SNR_DB).clamp(0.0, MAX_CONFIDENCE)
        };
        true
    }

    /// Lower confidence by [`CONFIDENCE_DECAY`], floored at 0
    pub fn decay_confidence(&mut self) {
        self.confidence = (self.confidence - CONFIDENCE_DECAY).max(0.0);
    }

    pub fn current_bpm(&self) -> Option<f64> {
        self.current_bpm
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn median(values: &VecDeque<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Cadence state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    /// No candidate accepted yet this session
    Uninitialized,
    /// Counting down from the last accepted update
    Armed { last_update: f64 },
}

/// What the gate did with a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Offered to the smoother
    Accepted,
    /// Minimum interval not yet elapsed; ignored
    Waiting,
    /// Interval elapsed but SNR too low; confidence decayed
    Rejected,
}

/// Minimum-interval update gate
#[derive(Debug, Clone)]
pub struct UpdateGate {
    interval_secs: f64,
    state: GateState,
}

impl UpdateGate {
    pub fn new(interval_secs: f64) -> Self {
        Self {
            interval_secs,
            state: GateState::Uninitialized,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn interval_secs(&self) -> f64 {
        self.interval_secs
    }

    /// Route a candidate through the gate into `smoother`.
    ///
    /// The timer restarts whenever the gate accepts, even if the smoother
    /// then discards the value as implausible.
    pub fn offer(
        &mut self,
        smoother: &mut BpmSmoother,
        bpm: f64,
        avg_snr: f64,
        now: f64,
    ) -> GateDecision {
        match self.state {
            GateState::Uninitialized => {
                self.state = GateState::Armed { last_update: now };
                self.accept(smoother, bpm, avg_snr);
                GateDecision::Accepted
            }
            GateState::Armed { last_update } if now - last_update < self.interval_secs => {
                GateDecision::Waiting
            }
            GateState::Armed { .. } => {
                if avg_snr > UPDATE_SNR_THRESHOLD_DB {
                    self.state = GateState::Armed { last_update: now };
                    self.accept(smoother, bpm, avg_snr);
                    GateDecision::Accepted
                } else {
                    smoother.decay_confidence();
                    debug!(
                        avg_snr,
                        confidence = smoother.confidence(),
                        "low SNR, candidate rejected"
                    );
                    GateDecision::Rejected
                }
            }
        }
    }

    fn accept(&self, smoother: &mut BpmSmoother, bpm: f64, avg_snr: f64) {
        if smoother.accept_candidate(bpm, avg_snr) {
            info!(
                candidate = bpm,
                bpm = smoother.current_bpm(),
                confidence = smoother.confidence(),
                "heart rate updated"
            );
        }
    }

    /// Seconds until the gate re-opens; `None` before the first update
    pub fn time_remaining(&self, now: f64) -> Option<f64> {
        match self.state {
            GateState::Uninitialized => None,
            GateState::Armed { last_update } => {
                Some((self.interval_secs - (now - last_update)).max(0.0))
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = GateState::Uninitialized;
    }
}
