//! Pass/fail gates over a measured recording
//!
//! Gates run in a fixed order and evaluation stops at the first one that fails,
//! except that the strength and roll-off checks of the final gate are both
//! reported:
//!
//! 1. clipping (two consecutive samples at or above the ceiling)
//! 2. alignment / missed prefix (handled by the analyzer)
//! 3. trial consistency (mean coefficient of variation of raw powers)
//! 4. NaN in the response curve
//! 5. signal above noise, and high band not rolled off against the reference
//!
//! [`is_silence`] is a separate screen callers run before anything else.

use crate::error::{AnalysisError, Result};
use crate::stats::{closest_index, coefficient_of_variation, mean, median, power_to_db};
use crate::trials::PowerMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Why a recording failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Silence,
    Clipped,
    MissedPrefix,
    Inconsistent,
    UnexpectedNan,
    SignalTooWeak,
    RollOff,
}

impl FailureKind {
    pub fn description(self) -> &'static str {
        match self {
            Self::Silence => "silence",
            Self::Clipped => "clipped input",
            Self::MissedPrefix => "missed prefix",
            Self::Inconsistent => "inconsistent across trials",
            Self::UnexpectedNan => "unexpected NaN",
            Self::SignalTooWeak => "signal too weak / noise too strong",
            Self::RollOff => "high-frequency response below threshold",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A failed gate with its human-readable detail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    /// Recording problem behind a `MissedPrefix` failure
    #[serde(skip)]
    pub cause: Option<AnalysisError>,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl fmt::Display) -> Self {
        Self {
            kind,
            message: format!("{}: {}", kind.description(), detail),
            cause: None,
        }
    }

    /// Failure caused by a typed analysis error, which is kept on the failure
    pub fn from_error(kind: FailureKind, error: AnalysisError) -> Self {
        Self {
            cause: Some(error.clone()),
            ..Self::new(kind, error)
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Fixed decision constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Every sample below this magnitude means silence
    pub silence_threshold: f64,
    /// Nominal clipping ceiling for normalized samples
    pub clip_ceiling: f64,
    /// Largest acceptable mean coefficient of variation across frequencies
    pub max_mean_cv: f64,
    /// Required `mean(signal_dB) - mean(noise_dB)`
    pub min_signal_above_noise_db: f64,
    /// Allowed roll-off relative to the reference frequency (negative)
    pub passing_offset_db: f64,
    pub reference_frequency_hz: f64,
    pub band_low_hz: f64,
    pub band_high_hz: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            silence_threshold: 0.001,
            clip_ceiling: 0.999,
            max_mean_cv: 1.0,
            min_signal_above_noise_db: 10.0,
            passing_offset_db: -18.0,
            reference_frequency_hz: 2000.0,
            band_low_hz: 18500.0,
            band_high_hz: 20000.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(AnalysisError::InvalidThreshold(what.to_string()));

        if !self.silence_threshold.is_finite() || self.silence_threshold < 0.0 {
            return invalid("silence_threshold must be finite and non-negative");
        }
        if !self.clip_ceiling.is_finite() || self.clip_ceiling <= 0.0 {
            return invalid("clip_ceiling must be positive");
        }
        if !self.max_mean_cv.is_finite() || self.max_mean_cv <= 0.0 {
            return invalid("max_mean_cv must be positive");
        }
        if !self.min_signal_above_noise_db.is_finite() {
            return invalid("min_signal_above_noise_db must be finite");
        }
        if !self.passing_offset_db.is_finite() || self.passing_offset_db > 0.0 {
            return invalid("passing_offset_db must be zero or negative");
        }
        let freqs = [
            self.reference_frequency_hz,
            self.band_low_hz,
            self.band_high_hz,
        ];
        if freqs.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return invalid("reference and band frequencies must be positive");
        }
        if self.band_low_hz > self.band_high_hz {
            return invalid("band_low_hz must not exceed band_high_hz");
        }
        Ok(())
    }
}

/// Every sample is quieter than `threshold`
pub fn is_silence(samples: &[f32], threshold: f64) -> bool {
    samples.iter().all(|&s| f64::from(s.abs()) < threshold)
}

/// Two consecutive samples both reach `ceiling` in magnitude
///
/// Isolated extreme samples are not clipping.
pub fn is_clipped(samples: &[f32], ceiling: f64) -> bool {
    samples
        .windows(2)
        .any(|pair| pair.iter().all(|&s| f64::from(s.abs()) >= ceiling))
}

/// Average over frequencies of each frequency's coefficient of variation
pub fn mean_coefficient_of_variation(matrix: &PowerMatrix) -> f64 {
    let cvs: Vec<f64> = matrix.rows().map(coefficient_of_variation).collect();
    mean(&cvs)
}

/// Median trial power per frequency, in dB
pub fn response_db(matrix: &PowerMatrix) -> Vec<f64> {
    matrix.rows().map(|row| power_to_db(median(row))).collect()
}

/// Outcome of gates 3-5
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub mean_cv: f64,
    /// Empty if the consistency gate failed
    pub response_db: Vec<f64>,
    /// `mean(response_db) - mean(noise_db)`, once computed
    pub signal_margin_db: Option<f64>,
    /// Roll-off threshold, once computed
    pub threshold_db: Option<f64>,
    /// Mean response over the high band, once computed
    pub band_average_db: Option<f64>,
    pub failures: Vec<Failure>,
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run the consistency, NaN, and strength/roll-off gates
///
/// `frequencies` must be the plan's ascending test frequencies, matching the
/// rows of `matrix` and the entries of `noise_db`.
///
/// # Errors
/// [`AnalysisError::LengthMismatch`] if `noise_db` or the matrix rows do not
/// line up with `frequencies`. Gate failures are not errors; they are listed
/// in [`Evaluation::failures`].
pub fn evaluate(
    matrix: &PowerMatrix,
    noise_db: &[f64],
    frequencies: &[f64],
    thresholds: &Thresholds,
) -> Result<Evaluation> {
    for (what, actual) in [
        ("power matrix rows", matrix.frequencies()),
        ("noise floor", noise_db.len()),
    ] {
        if actual != frequencies.len() {
            return Err(AnalysisError::LengthMismatch {
                what,
                expected: frequencies.len(),
                actual,
            });
        }
    }

    let mean_cv = mean_coefficient_of_variation(matrix);
    let mut evaluation = Evaluation {
        mean_cv,
        response_db: Vec::new(),
        signal_margin_db: None,
        threshold_db: None,
        band_average_db: None,
        failures: Vec::new(),
    };

    debug!(mean_cv, "Trial consistency");
    if mean_cv > thresholds.max_mean_cv {
        let failure = Failure::new(
            FailureKind::Inconsistent,
            format!(
                "mean coefficient of variation {:.3} exceeds {:.3}",
                mean_cv, thresholds.max_mean_cv
            ),
        );
        warn!("{}", failure);
        evaluation.failures.push(failure);
        return Ok(evaluation);
    }

    evaluation.response_db = response_db(matrix);
    if let Some(i) = evaluation.response_db.iter().position(|v| v.is_nan()) {
        let failure = Failure::new(
            FailureKind::UnexpectedNan,
            format!("response at {:.0} Hz is NaN", frequencies[i]),
        );
        warn!("{}", failure);
        evaluation.failures.push(failure);
        return Ok(evaluation);
    }

    let response = &evaluation.response_db;
    let margin = mean(response) - mean(noise_db);
    evaluation.signal_margin_db = Some(margin);
    if margin.is_nan() || margin < thresholds.min_signal_above_noise_db {
        evaluation.failures.push(Failure::new(
            FailureKind::SignalTooWeak,
            format!(
                "signal is {:.1} dB above noise, need {:.1} dB",
                margin, thresholds.min_signal_above_noise_db
            ),
        ));
    }

    if let (Some(reference), Some(low), Some(high)) = (
        closest_index(frequencies, thresholds.reference_frequency_hz),
        closest_index(frequencies, thresholds.band_low_hz),
        closest_index(frequencies, thresholds.band_high_hz),
    ) {
        let threshold = response[reference] + thresholds.passing_offset_db;
        let band_average = mean(&response[low.min(high)..=low.max(high)]);
        debug!(
            threshold,
            band_average,
            reference_hz = frequencies[reference],
            "Roll-off check"
        );
        evaluation.threshold_db = Some(threshold);
        evaluation.band_average_db = Some(band_average);
        if band_average < threshold {
            evaluation.failures.push(Failure::new(
                FailureKind::RollOff,
                format!(
                    "{:.0}-{:.0} Hz averages {:.1} dB, threshold {:.1} dB",
                    frequencies[low], frequencies[high], band_average, threshold
                ),
            ));
        }
    }

    for failure in &evaluation.failures {
        warn!("{}", failure);
    }
    Ok(evaluation)
}
