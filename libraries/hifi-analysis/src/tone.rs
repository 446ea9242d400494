//! Single-frequency power estimation
//!
//! A generalized single-bin DFT: the windowed segment is correlated against a
//! complex exponential at the target frequency. Unlike a bin-aligned Goertzel
//! filter the target need not be an integer multiple of `sample_rate / len`.
//!
//! The phasor is advanced by repeated multiplication with a fixed rotator, so
//! only one `sin`/`cos` pair is evaluated per call.

use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Power of the component at `frequency_hz` in an already windowed segment
///
/// Returned as one-sided power: a full-scale sine of amplitude `A` that spans
/// an integer number of periods reads `A² / 2`. The estimator does not apply
/// any apodization itself; see [`apply_window`].
///
/// An empty segment has zero power.
pub fn tone_power(windowed: &[f64], frequency_hz: f64, sample_rate: u32) -> f64 {
    if windowed.is_empty() {
        return 0.0;
    }

    let omega = -2.0 * PI * frequency_hz / f64::from(sample_rate);
    let rotator = Complex::new(omega.cos(), omega.sin());

    let mut phasor = Complex::new(1.0, 0.0);
    let mut coeff = Complex::new(0.0, 0.0);
    for &x in windowed {
        coeff += phasor * x;
        phasor *= rotator;
    }

    let coeff = coeff / windowed.len() as f64;
    // |c|² counts the positive-frequency half only; double it for one-sided power
    2.0 * (coeff * coeff.conj()).norm()
}

/// Multiply `segment` by the apodization `window`, element-wise
///
/// The result has the length of the shorter input.
pub fn apply_window(segment: &[f32], window: &[f64]) -> Vec<f64> {
    segment
        .iter()
        .zip(window)
        .map(|(&s, &w)| f64::from(s) * w)
        .collect()
}
