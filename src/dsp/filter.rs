//! Normalization and zero-phase Butterworth bandpass
//!
//! The bandpass is designed as cascaded second-order sections: analog
//! Butterworth prototype, lowpass-to-bandpass transform, bilinear transform
//! with prewarped edges. Filtering runs forward then backward over an
//! odd-extended copy of the input with steady-state initial conditions, so the
//! output has no phase lag and no start-up transient.

use crate::error::PulseError;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Guard for variance and ratio denominators
pub const EPSILON: f64 = 1e-10;

/// Tolerance for treating a pole as real
const REAL_POLE_TOLERANCE: f64 = 1e-12;

/// Arithmetic mean, 0 for an empty slice
pub fn mean(seq: &[f64]) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    seq.iter().sum::<f64>() / seq.len() as f64
}

/// Population standard deviation, 0 for an empty slice
pub fn std_dev(seq: &[f64]) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    let m = mean(seq);
    (seq.iter().map(|v| (v - m).powi(2)).sum::<f64>() / seq.len() as f64).sqrt()
}

/// Zero-mean, unit-variance copy. A constant input maps to all zeros.
pub fn normalize(seq: &[f64]) -> Vec<f64> {
    if seq.is_empty() {
        return Vec::new();
    }
    let m = mean(seq);
    let sd = std_dev(seq);
    // rounding residue of a flat input must not be scaled up by 1/EPSILON
    if sd <= EPSILON {
        return vec![0.0; seq.len()];
    }
    seq.iter().map(|v| (v - m) / (sd + EPSILON)).collect()
}

/// One second-order section, `a[0]` normalized to 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// Frequency response at `z`
    fn response(&self, z: Complex64) -> Complex64 {
        let z1 = z.inv();
        let z2 = z1 * z1;
        (self.b[0] + z1 * self.b[1] + z2 * self.b[2]) / (self.a[0] + z1 * self.a[1] + z2 * self.a[2])
    }

    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// Direct-form-II-transposed state for a unit step in steady state
    fn step_state(&self) -> [f64; 2] {
        let y = self.dc_gain();
        let z2 = self.b[2] - self.a[2] * y;
        let z1 = self.b[1] - self.a[1] * y + z2;
        [z1, z2]
    }
}

/// A cascade of second-order sections
#[derive(Debug, Clone, PartialEq)]
pub struct Bandpass {
    sections: Vec<Biquad>,
}

impl Bandpass {
    /// Design a Butterworth bandpass of the given prototype order.
    ///
    /// The resulting filter has `2 * order` poles.
    pub fn butterworth(low_hz: f64, high_hz: f64, fs: f64, order: usize) -> Result<Self, PulseError> {
        if order == 0 {
            return Err(PulseError::FilterDesign("order must be at least 1".to_string()));
        }
        if !(fs.is_finite() && fs > 0.0) {
            return Err(PulseError::FilterDesign(format!("invalid sample rate {fs}")));
        }
        let nyquist = fs / 2.0;
        if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist) {
            return Err(PulseError::FilterDesign(format!(
                "band [{low_hz}, {high_hz}] Hz invalid for Nyquist {nyquist} Hz"
            )));
        }

        // prewarped analog edges
        let fs2 = 2.0 * fs;
        let w_low = fs2 * (PI * low_hz / fs).tan();
        let w_high = fs2 * (PI * high_hz / fs).tan();
        let bandwidth = w_high - w_low;
        let w0 = (w_low * w_high).sqrt();

        let mut poles = Vec::with_capacity(2 * order);
        for k in 0..order {
            let theta = PI / 2.0 + PI * (2 * k + 1) as f64 / (2 * order) as f64;
            let prototype = Complex64::from_polar(1.0, theta);

            let half = prototype * (bandwidth / 2.0);
            let disc = (half * half - w0 * w0).sqrt();
            for analog in [half + disc, half - disc] {
                poles.push((fs2 + analog) / (fs2 - analog));
            }
        }

        let mut sections = Vec::with_capacity(order);
        let mut real_poles = Vec::new();
        for pole in &poles {
            if pole.im > REAL_POLE_TOLERANCE {
                sections.push(Biquad {
                    b: [1.0, 0.0, -1.0],
                    a: [1.0, -2.0 * pole.re, pole.norm_sqr()],
                });
            } else if pole.im.abs() <= REAL_POLE_TOLERANCE {
                real_poles.push(pole.re);
            }
        }
        if real_poles.len() % 2 != 0 {
            return Err(PulseError::FilterDesign(
                "unpaired real pole in bandpass design".to_string(),
            ));
        }
        for pair in real_poles.chunks_exact(2) {
            sections.push(Biquad {
                b: [1.0, 0.0, -1.0],
                a: [1.0, -(pair[0] + pair[1]), pair[0] * pair[1]],
            });
        }

        // unit gain at the digital image of the analog center frequency
        let center = Complex64::from_polar(1.0, 2.0 * (w0 / fs2).atan());
        let response = sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(center));
        let magnitude = response.norm();
        if !(magnitude.is_finite() && magnitude > 0.0) {
            return Err(PulseError::FilterDesign("degenerate passband gain".to_string()));
        }
        let per_section = magnitude.powf(-1.0 / sections.len() as f64);
        for section in sections.iter_mut() {
            for coeff in section.b.iter_mut() {
                *coeff *= per_section;
            }
        }

        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Samples of odd extension added to each end before filtering
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Magnitude response at `freq_hz`
    pub fn gain_at(&self, freq_hz: f64, fs: f64) -> f64 {
        let z = Complex64::from_polar(1.0, 2.0 * PI * freq_hz / fs);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z))
            .norm()
    }

    /// Forward-backward filtering; the input must be longer than `pad_len()`
    pub fn filtfilt(&self, input: &[f64]) -> Result<Vec<f64>, PulseError> {
        let pad = self.pad_len();
        if input.len() <= pad {
            return Err(PulseError::InsufficientSamples {
                needed: pad,
                got: input.len(),
            });
        }

        let extended = odd_extend(input, pad);
        let forward = self.run(&extended, extended[0]);

        let mut backward: Vec<f64> = forward.into_iter().rev().collect();
        let start = backward[0];
        backward = self.run(&backward, start);
        backward.reverse();

        Ok(backward[pad..backward.len() - pad].to_vec())
    }

    /// Single pass, states primed as if `initial` had been applied forever
    fn run(&self, input: &[f64], initial: f64) -> Vec<f64> {
        let mut states = Vec::with_capacity(self.sections.len());
        let mut scale = 1.0;
        for section in &self.sections {
            let [z1, z2] = section.step_state();
            states.push([z1 * scale * initial, z2 * scale * initial]);
            scale *= section.dc_gain();
        }

        let mut output = input.to_vec();
        for (section, state) in self.sections.iter().zip(states.iter_mut()) {
            for sample in output.iter_mut() {
                let x = *sample;
                let y = section.b[0] * x + state[0];
                state[0] = section.b[1] * x - section.a[1] * y + state[1];
                state[1] = section.b[2] * x - section.a[2] * y;
                *sample = y;
            }
        }
        output
    }
}

/// Reflect `pad` samples about each endpoint (point symmetry)
fn odd_extend(input: &[f64], pad: usize) -> Vec<f64> {
    let n = input.len();
    let (first, last) = (input[0], input[n - 1]);

    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
    out.extend_from_slice(input);
    out.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i]));
    out
}

/// Design and apply a zero-phase Butterworth bandpass in one call
pub fn bandpass(
    seq: &[f64],
    low_hz: f64,
    high_hz: f64,
    fs: f64,
    order: usize,
) -> Result<Vec<f64>, PulseError> {
    Bandpass::butterworth(low_hz, high_hz, fs, order)?.filtfilt(seq)
}
