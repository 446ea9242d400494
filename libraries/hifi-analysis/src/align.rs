//! Preamble alignment by FFT cross-correlation
//!
//! The head of the recording and the reference preamble are both zero-padded
//! to a power-of-two working length and correlated as
//! `IFFT(FFT(recording) · conj(FFT(preamble)))`. `preamble_len - 1` samples of
//! the working length are reserved as padding so the circular correlation
//! equals the linear one over every candidate start.

use crate::error::{AnalysisError, Result};
use crate::plan::TestPlan;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::Serialize;
use tracing::{debug, warn};

/// Where the preamble was found
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Alignment {
    /// Sample index of the first preamble sample
    pub preamble_start: usize,
    /// Correlation magnitude at the peak
    pub peak: f64,
    /// The start is later than the plan allows; still the best estimate
    pub late: bool,
}

/// Locate the preamble in `samples`
///
/// # Errors
/// [`AnalysisError::InsufficientData`] if the recording is shorter than the
/// preamble.
pub fn locate_preamble(samples: &[f32], plan: &TestPlan) -> Result<Alignment> {
    let preamble = plan.preamble();
    if samples.len() < preamble.len() {
        return Err(AnalysisError::InsufficientData {
            required: preamble.len(),
            available: samples.len(),
        });
    }

    let pad = preamble.len() - 1;
    let working_len = (plan.alignment_span_len().max(preamble.len()) + pad).next_power_of_two();
    let segment_len = (working_len - pad).min(samples.len());
    debug!(
        working_len,
        segment_len,
        preamble_len = preamble.len(),
        "Correlating recording head against preamble"
    );

    let segment: Vec<f64> = samples[..segment_len]
        .iter()
        .map(|&s| f64::from(s))
        .collect();
    let correlation = cross_correlate(&segment, preamble, working_len);

    // Lags past the segment would wrap around to negative delays
    let (preamble_start, peak) = correlation[..segment_len]
        .iter()
        .map(|c| c.abs())
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, mag)| {
            if mag > best.1 {
                (i, mag)
            } else {
                best
            }
        });

    let late = preamble_start > plan.max_preamble_start();
    if late {
        warn!(
            preamble_start,
            max_expected = plan.max_preamble_start(),
            "Preamble found later than expected; continuing with best estimate"
        );
    } else {
        debug!(preamble_start, peak, "Preamble located");
    }

    Ok(Alignment {
        preamble_start,
        peak,
        late,
    })
}

/// Circular cross-correlation of `signal` against `reference`
///
/// Both inputs are zero-padded to `len`; `out[k] = Σ signal[n + k] * reference[n]`
/// (indices mod `len`). With `len >= signal.len() + reference.len() - 1` this
/// is the linear correlation for every lag `k < signal.len()`.
pub fn cross_correlate(signal: &[f64], reference: &[f64], len: usize) -> Vec<f64> {
    let mut planner = FftPlanner::<f64>::new();
    let fft_forward = planner.plan_fft_forward(len);
    let fft_inverse = planner.plan_fft_inverse(len);

    let mut a = zero_padded(signal, len);
    let mut b = zero_padded(reference, len);
    fft_forward.process(&mut a);
    fft_forward.process(&mut b);

    let mut product: Vec<Complex<f64>> = a.iter().zip(&b).map(|(x, y)| x * y.conj()).collect();
    fft_inverse.process(&mut product);

    // rustfft leaves the inverse unnormalized
    let scale = 1.0 / len as f64;
    product.iter().map(|c| c.re * scale).collect()
}

fn zero_padded(data: &[f64], len: usize) -> Vec<Complex<f64>> {
    let mut buffer = vec![Complex::new(0.0, 0.0); len];
    for (slot, &x) in buffer.iter_mut().zip(data) {
        *slot = Complex::new(x, 0.0);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanConfig;

    fn plan() -> TestPlan {
        TestPlan::from_config(&PlanConfig::default()).unwrap()
    }

    fn recording_with_preamble_at(plan: &TestPlan, offset: usize, total: usize) -> Vec<f32> {
        let mut samples = vec![0.0_f32; total];
        for (i, &p) in plan.preamble().iter().enumerate() {
            samples[offset + i] = 0.3 * p as f32;
        }
        samples
    }

    #[test]
    fn test_locates_exact_offset() {
        let plan = plan();
        for offset in [0, 1, 777, 24000, 40000] {
            let samples = recording_with_preamble_at(&plan, offset, 100_000);
            let alignment = locate_preamble(&samples, &plan).unwrap();
            assert_eq!(alignment.preamble_start, offset);
            assert!(!alignment.late);
        }
    }

    #[test]
    fn test_locates_offset_under_noise() {
        let plan = plan();
        let mut samples = recording_with_preamble_at(&plan, 23456, 100_000);
        let mut seed: u64 = 12345;
        for s in &mut samples {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let r = ((seed >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0;
            *s += 0.2 * r;
        }
        let alignment = locate_preamble(&samples, &plan).unwrap();
        assert!(
            (alignment.preamble_start as i64 - 23456).abs() <= 2,
            "got {}",
            alignment.preamble_start
        );
    }

    #[test]
    fn test_late_preamble_is_flagged_not_rejected() {
        let plan = plan();
        let offset = plan.max_preamble_start() + 5000;
        let samples = recording_with_preamble_at(&plan, offset, 200_000);
        let alignment = locate_preamble(&samples, &plan).unwrap();
        assert_eq!(alignment.preamble_start, offset);
        assert!(alignment.late);
    }

    #[test]
    fn test_short_recording_is_insufficient() {
        let plan = plan();
        let samples = vec![0.1_f32; plan.preamble_len() - 1];
        assert_eq!(
            locate_preamble(&samples, &plan),
            Err(AnalysisError::InsufficientData {
                required: plan.preamble_len(),
                available: plan.preamble_len() - 1,
            })
        );
    }

    #[test]
    fn test_recording_shorter_than_working_window() {
        let plan = plan();
        // Holds the preamble but not the full alignment span
        let samples = recording_with_preamble_at(&plan, 1000, plan.preamble_len() + 2000);
        assert_eq!(locate_preamble(&samples, &plan).unwrap().preamble_start, 1000);
    }

    #[test]
    fn test_fft_matches_direct_correlation() {
        let signal = [0.0, 1.0, -2.0, 3.0, 0.5, -1.0, 2.0];
        let reference = [1.0, -1.0, 0.5];
        let len = (signal.len() + reference.len() - 1).next_power_of_two();
        let fast = cross_correlate(&signal, &reference, len);

        for k in 0..signal.len() {
            let direct: f64 = reference
                .iter()
                .enumerate()
                .map(|(n, &r)| signal.get(n + k).copied().unwrap_or(0.0) * r)
                .sum();
            assert!(
                (fast[k] - direct).abs() < 1e-9,
                "lag {k}: fft {} vs direct {direct}",
                fast[k]
            );
        }
    }
}
