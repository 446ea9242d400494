//! Noise floor estimation from the silence before the preamble
//!
//! `S` windows are tiled backward from just before the preamble start:
//!
//! ```text
//!   ... | noise S-1 | ... | noise 1 | noise 0 |g| preamble ...
//! ```
//!
//! where `g` is a one-sample guard ([`NOISE_GUARD_SAMPLES`]). Each window is
//! apodized and measured at every test frequency; powers are averaged per
//! frequency before conversion to dB.

use crate::error::{AnalysisError, Result};
use crate::plan::TestPlan;
use crate::stats::{mean, power_to_db};
use crate::tone::{apply_window, tone_power};
use serde::Serialize;
use tracing::debug;

/// Samples skipped between the last noise window and the preamble start
pub const NOISE_GUARD_SAMPLES: usize = 1;

/// Noise power per frequency and noise window, plus the averaged dB curve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoiseFloor {
    /// `power[frequency][noise_window]`
    pub power: Vec<Vec<f64>>,
    /// `10 * log10(mean(power[frequency]))`
    pub db: Vec<f64>,
}

/// Pre-roll samples the noise windows need before the preamble
pub fn required_preroll(plan: &TestPlan) -> usize {
    plan.noise_samples() * plan.window_len() + NOISE_GUARD_SAMPLES
}

/// Measure the noise floor ahead of a preamble starting at `preamble_start`
///
/// # Errors
/// [`AnalysisError::InsufficientPreroll`] if the preamble starts too early for
/// all noise windows to fit, [`AnalysisError::InsufficientData`] if the
/// recording ends before the preamble start.
pub fn estimate_noise_floor(
    samples: &[f32],
    plan: &TestPlan,
    preamble_start: usize,
) -> Result<NoiseFloor> {
    let required = required_preroll(plan);
    if preamble_start < required {
        return Err(AnalysisError::InsufficientPreroll {
            preamble_start,
            required,
        });
    }
    if preamble_start > samples.len() {
        return Err(AnalysisError::InsufficientData {
            required: preamble_start,
            available: samples.len(),
        });
    }

    let window = plan.window();
    let w = window.len();
    let frequencies = plan.frequencies();
    let mut power = vec![Vec::with_capacity(plan.noise_samples()); frequencies.len()];

    for s in 0..plan.noise_samples() {
        let start = preamble_start - (s + 1) * w - NOISE_GUARD_SAMPLES;
        let windowed = apply_window(&samples[start..start + w], window);
        for (f, &frequency) in frequencies.iter().enumerate() {
            power[f].push(tone_power(&windowed, frequency, plan.sample_rate()));
        }
    }

    let db: Vec<f64> = power.iter().map(|p| power_to_db(mean(p))).collect();
    debug!(
        windows = plan.noise_samples(),
        mean_noise_db = mean(&db),
        "Noise floor measured"
    );

    Ok(NoiseFloor { power, db })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{hann, Timing};
    use std::f64::consts::PI;

    fn small_plan(noise_samples: usize) -> TestPlan {
        let timing = Timing {
            sample_rate: 48000,
            pip_duration_s: 0.002,
            pip_pause_s: 0.002,
            preamble_duration_s: 0.001,
            pause_before_preamble_s: 0.01,
            pause_after_preamble_s: 0.001,
            alignment_margin_s: 0.0,
        };
        TestPlan::new(
            timing,
            vec![1000.0, 6000.0],
            1,
            noise_samples,
            vec![0, 1],
            vec![1.0; 48],
            hann(96),
        )
        .unwrap()
    }

    #[test]
    fn test_insufficient_preroll() {
        let plan = small_plan(3);
        let samples = vec![0.0_f32; 2000];
        // 3 windows of 96 plus the guard sample
        assert_eq!(required_preroll(&plan), 289);
        assert_eq!(
            estimate_noise_floor(&samples, &plan, 288),
            Err(AnalysisError::InsufficientPreroll {
                preamble_start: 288,
                required: 289
            })
        );
        assert!(estimate_noise_floor(&samples, &plan, 289).is_ok());
    }

    #[test]
    fn test_noise_tone_is_measured_per_frequency() {
        let plan = small_plan(2);
        // 6 kHz hum before the preamble
        let samples: Vec<f32> = (0..1000)
            .map(|n| (0.1 * (2.0 * PI * 6000.0 * n as f64 / 48000.0).sin()) as f32)
            .collect();
        let floor = estimate_noise_floor(&samples, &plan, 500).unwrap();
        assert_eq!(floor.power.len(), 2);
        assert_eq!(floor.power[0].len(), 2);
        assert!(
            floor.db[1] > floor.db[0] + 20.0,
            "6 kHz noise should dominate: {:?}",
            floor.db
        );
    }

    #[test]
    fn test_windows_exclude_preamble() {
        let plan = small_plan(1);
        // Everything from the preamble start on is loud; the window must not see it
        let mut samples = vec![0.0_f32; 1000];
        for s in &mut samples[400..] {
            *s = 0.9;
        }
        let floor = estimate_noise_floor(&samples, &plan, 400).unwrap();
        assert!(floor.power.iter().flatten().all(|&p| p == 0.0));
        assert!(floor.db.iter().all(|d| *d == f64::NEG_INFINITY));
    }

    #[test]
    fn test_preamble_start_past_end() {
        let plan = small_plan(1);
        let samples = vec![0.0_f32; 100];
        assert!(matches!(
            estimate_noise_floor(&samples, &plan, 500),
            Err(AnalysisError::InsufficientData { .. })
        ));
    }
}
