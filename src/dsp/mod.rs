//! Signal processing primitives
//!
//! Pure functions over `&[f64]` shared by temporal quality scoring and the
//! heart-rate estimator.

pub mod filter;
pub mod peaks;
pub mod spectrum;

pub use filter::{bandpass, mean, normalize, std_dev, Bandpass, Biquad, EPSILON};
pub use peaks::{find_peaks, local_maxima};
pub use spectrum::{bin_frequencies, compute_snr, magnitude_spectrum, one_sided_spectrum};
