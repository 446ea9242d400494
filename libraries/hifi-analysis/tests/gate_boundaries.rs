//! Boundary behavior of the decision gates on hand-built power matrices

use hifi_analysis::{evaluate, is_clipped, is_silence, FailureKind, PowerMatrix, Thresholds};
use proptest::prelude::*;

const FREQUENCIES: [f64; 8] = [
    1000.0, 2000.0, 10000.0, 18500.0, 19000.0, 19500.0, 20000.0, 21000.0,
];

fn kinds(matrix: &PowerMatrix, thresholds: &Thresholds) -> Vec<FailureKind> {
    let noise = vec![-100.0; FREQUENCIES.len()];
    evaluate(matrix, &noise, &FREQUENCIES, thresholds)
        .unwrap()
        .failures
        .iter()
        .map(|f| f.kind)
        .collect()
}

/// Every frequency gets the same three trials
fn repeated_rows(trials: [f64; 3]) -> PowerMatrix {
    PowerMatrix::from_rows(&vec![trials.to_vec(); FREQUENCIES.len()]).unwrap()
}

/// Flat power everywhere except the 18.5-20 kHz band
fn band_rows(reference: f64, band: f64) -> PowerMatrix {
    let rows: Vec<Vec<f64>> = FREQUENCIES
        .iter()
        .map(|&f| {
            let p = if (18500.0..=20000.0).contains(&f) { band } else { reference };
            vec![p; 3]
        })
        .collect();
    PowerMatrix::from_rows(&rows).unwrap()
}

// ========== Consistency ==========

#[test]
fn test_cv_just_below_limit_passes() {
    // [m - d, m - d, m + 2d] has CV = d * sqrt(2) / m; d = 0.7 gives 0.990
    let matrix = repeated_rows([0.3, 0.3, 2.4]);
    let eval = evaluate(&matrix, &[-100.0; 8], &FREQUENCIES, &Thresholds::default()).unwrap();
    assert!(eval.mean_cv < 1.0 && eval.mean_cv > 0.98, "cv {}", eval.mean_cv);
    assert!(eval.passed(), "{:?}", eval.failures);
}

#[test]
fn test_cv_just_above_limit_fails() {
    // d = 0.72 gives 1.018
    let matrix = repeated_rows([0.28, 0.28, 2.44]);
    assert_eq!(
        kinds(&matrix, &Thresholds::default()),
        vec![FailureKind::Inconsistent]
    );
}

// ========== Roll-off ==========

#[test]
fn test_flat_response_passes_roll_off() {
    assert!(kinds(&band_rows(1.0, 1.0), &Thresholds::default()).is_empty());
}

#[test]
fn test_band_exactly_at_threshold_passes() {
    let thresholds = Thresholds {
        passing_offset_db: 0.0,
        ..Thresholds::default()
    };
    // Reference 0 dB, band 0 dB, threshold 0 dB
    assert!(kinds(&band_rows(1.0, 1.0), &thresholds).is_empty());
}

#[test]
fn test_band_one_db_below_threshold_fails() {
    let thresholds = Thresholds {
        passing_offset_db: 0.0,
        ..Thresholds::default()
    };
    let matrix = band_rows(1.0, 10f64.powf(-0.1));
    assert_eq!(kinds(&matrix, &thresholds), vec![FailureKind::RollOff]);

    let eval = evaluate(&matrix, &[-100.0; 8], &FREQUENCIES, &thresholds).unwrap();
    assert!((eval.band_average_db.unwrap() - (-1.0)).abs() < 1e-9);
    assert_eq!(eval.threshold_db, Some(0.0));
}

#[test]
fn test_default_offset_one_db_below_threshold_fails() {
    // Reference 0 dB, default offset -18 dB: band at -19 dB is one dB short
    let matrix = band_rows(1.0, 10f64.powf(-1.9));
    assert_eq!(
        kinds(&matrix, &Thresholds::default()),
        vec![FailureKind::RollOff]
    );

    let eval = evaluate(&matrix, &[-100.0; 8], &FREQUENCIES, &Thresholds::default()).unwrap();
    assert_eq!(eval.threshold_db, Some(-18.0));
    assert!((eval.band_average_db.unwrap() - (-19.0)).abs() < 1e-9);
}

#[test]
fn test_default_offset_one_db_above_threshold_passes() {
    let matrix = band_rows(1.0, 10f64.powf(-1.7));
    assert!(kinds(&matrix, &Thresholds::default()).is_empty());
}

#[test]
fn test_weak_signal_reported_with_roll_off() {
    let matrix = band_rows(1e-10, 1e-14);
    let noise = vec![-95.0; FREQUENCIES.len()];
    let eval = evaluate(&matrix, &noise, &FREQUENCIES, &Thresholds::default()).unwrap();
    let kinds: Vec<FailureKind> = eval.failures.iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FailureKind::SignalTooWeak, FailureKind::RollOff]);
}

// ========== Sample Screens ==========

proptest! {
    /// Anything strictly inside the silence threshold is silence
    #[test]
    fn quiet_signals_are_silence(samples in prop::collection::vec(-0.000_99_f32..0.000_99, 1..500)) {
        prop_assert!(is_silence(&samples, 0.001));
    }

    /// One sample at the threshold breaks silence
    #[test]
    fn one_loud_sample_breaks_silence(
        mut samples in prop::collection::vec(-0.000_5_f32..0.000_5, 1..500),
        index in any::<prop::sample::Index>(),
        negative in any::<bool>(),
    ) {
        let i = index.index(samples.len());
        samples[i] = if negative { -0.001 } else { 0.001 };
        prop_assert!(!is_silence(&samples, 0.001));
    }

    /// Two adjacent samples at the ceiling clip, regardless of sign
    #[test]
    fn adjacent_peaks_clip(
        mut samples in prop::collection::vec(-0.9_f32..0.9, 2..500),
        index in any::<prop::sample::Index>(),
        first_negative in any::<bool>(),
        second_negative in any::<bool>(),
    ) {
        prop_assert!(!is_clipped(&samples, 0.999));
        let i = index.index(samples.len() - 1);
        samples[i] = if first_negative { -1.0 } else { 1.0 };
        samples[i + 1] = if second_negative { -1.0 } else { 1.0 };
        prop_assert!(is_clipped(&samples, 0.999));
    }

    /// Peaks separated by at least one normal sample never clip
    #[test]
    fn separated_peaks_do_not_clip(len in 3usize..500) {
        let samples: Vec<f32> = (0..len).map(|i| if i % 2 == 0 { 1.0 } else { 0.5 }).collect();
        prop_assert!(!is_clipped(&samples, 0.999));
    }
}
