//! Frequency-response analyzer: runs every stage and the gates in order
//!
//! ```text
//! samples ─► silence/clip screen ─► align ─┬─► noise floor ─┐
//!                                          └─► trials ──────┴─► gates ─► AnalysisReport
//! ```
//!
//! Recording problems never escape as errors: alignment, pre-roll and
//! truncation failures become a `MissedPrefix` verdict that keeps the typed
//! [`AnalysisError`] as its cause. Only a malformed configuration is rejected,
//! when the analyzer is built.

use crate::align::locate_preamble;
use crate::decision::{evaluate, is_clipped, is_silence, Failure, FailureKind, Thresholds};
use crate::error::{AnalysisError, Result};
use crate::noise::estimate_noise_floor;
use crate::plan::{PlanConfig, TestPlan};
use crate::progress::{NoProgress, ProgressSink};
use crate::trials::{measure_trials, PowerMatrix};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Everything measured from a recording that made it past alignment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Sample index of the located preamble
    pub preamble_start: usize,
    /// Preamble was found later than the plan allows
    pub late_preamble: bool,
    /// Test frequencies, ascending
    pub frequencies: Vec<f64>,
    /// Noise floor per frequency in dB
    pub noise_db: Vec<f64>,
    /// Mean coefficient of variation of raw trial powers
    pub mean_cv: f64,
    /// Median response per frequency in dB (empty if trials were inconsistent)
    pub response_db: Vec<f64>,
    pub signal_margin_db: Option<f64>,
    pub threshold_db: Option<f64>,
    pub band_average_db: Option<f64>,
    /// Raw trial powers, `[frequency][repetition]`
    #[serde(skip_serializing)]
    pub trial_power: PowerMatrix,
    /// Raw noise powers, `[frequency][noise_window]`
    #[serde(skip_serializing)]
    pub noise_power: Vec<Vec<f64>>,
}

/// Verdict for one recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub passed: bool,
    /// Failed gates in evaluation order
    pub failures: Vec<Failure>,
    /// Absent when the run stopped before measuring
    pub measurement: Option<Measurement>,
}

impl AnalysisReport {
    fn failed(failure: Failure) -> Self {
        warn!("{}", failure);
        Self {
            passed: false,
            failures: vec![failure],
            measurement: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Kind of the first failed gate
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failures.first().map(|f| f.kind)
    }

    /// Typed recording problem behind the first failure, if any
    pub fn failure_cause(&self) -> Option<&AnalysisError> {
        self.failures.first().and_then(|f| f.cause.as_ref())
    }

    /// Diagnostic messages, one per failed gate
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.message.as_str())
    }

    /// Per-frequency response in dB, ordered like the test frequencies
    pub fn response_db(&self) -> Option<&[f64]> {
        self.measurement
            .as_ref()
            .map(|m| m.response_db.as_slice())
            .filter(|r| !r.is_empty())
    }

    /// Per-frequency noise floor in dB
    pub fn noise_db(&self) -> Option<&[f64]> {
        self.measurement.as_ref().map(|m| m.noise_db.as_slice())
    }

    /// Roll-off threshold in dB
    pub fn threshold_db(&self) -> Option<f64> {
        self.measurement.as_ref().and_then(|m| m.threshold_db)
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Result: {}", if self.passed { "PASS" } else { "FAIL" })?;
        for failure in &self.failures {
            writeln!(f, "  - {}", failure)?;
        }

        let Some(m) = &self.measurement else {
            return Ok(());
        };

        writeln!(f, "Preamble at sample {}", m.preamble_start)?;
        writeln!(f, "Mean coefficient of variation: {:.3}", m.mean_cv)?;
        if let Some(margin) = m.signal_margin_db {
            writeln!(f, "Signal above noise: {:.1} dB", margin)?;
        }
        if let (Some(threshold), Some(band)) = (m.threshold_db, m.band_average_db) {
            writeln!(
                f,
                "High band average: {:.1} dB (threshold {:.1} dB)",
                band, threshold
            )?;
        }

        if !m.response_db.is_empty() {
            writeln!(f, "{:>10}  {:>10}  {:>10}", "Freq (Hz)", "Signal dB", "Noise dB")?;
            for ((freq, signal), noise) in m.frequencies.iter().zip(&m.response_db).zip(&m.noise_db)
            {
                writeln!(f, "{:>10.0}  {:>10.1}  {:>10.1}", freq, signal, noise)?;
            }
        }
        Ok(())
    }
}

/// Frequency-response verification engine
///
/// # Example
///
/// ```
/// use hifi_analysis::{FrequencyResponseAnalyzer, PlanConfig, Thresholds};
///
/// let analyzer = FrequencyResponseAnalyzer::from_config(&PlanConfig::default(), Thresholds::default())
///     .unwrap()
///     .with_progress(|msg: &str| println!("{msg}"));
///
/// let silence = vec![0.0_f32; 48000];
/// let report = analyzer.analyze(&silence);
/// assert!(!report.passed());
/// ```
pub struct FrequencyResponseAnalyzer {
    plan: TestPlan,
    thresholds: Thresholds,
    progress: Box<dyn ProgressSink + Send + Sync>,
}

impl fmt::Debug for FrequencyResponseAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencyResponseAnalyzer")
            .field("plan", &self.plan)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl FrequencyResponseAnalyzer {
    /// Create an analyzer for an already validated plan
    ///
    /// # Errors
    /// Returns [`crate::AnalysisError::InvalidThreshold`] for out-of-range thresholds.
    pub fn new(plan: TestPlan, thresholds: Thresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            plan,
            thresholds,
            progress: Box::new(NoProgress),
        })
    }

    /// Create an analyzer for the standard plan described by `config`
    pub fn from_config(config: &PlanConfig, thresholds: Thresholds) -> Result<Self> {
        Self::new(TestPlan::from_config(config)?, thresholds)
    }

    /// Send status lines to `sink` during analysis
    #[must_use]
    pub fn with_progress(mut self, sink: impl ProgressSink + Send + Sync + 'static) -> Self {
        self.progress = Box::new(sink);
        self
    }

    pub fn plan(&self) -> &TestPlan {
        &self.plan
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Analyze one recording
    pub fn analyze(&self, samples: &[f32]) -> AnalysisReport {
        let report = self.run(samples);
        info!(
            passed = report.passed,
            failures = report.failures.len(),
            "Frequency response analysis finished"
        );
        report
    }

    fn run(&self, samples: &[f32]) -> AnalysisReport {
        if is_silence(samples, self.thresholds.silence_threshold) {
            return AnalysisReport::failed(Failure::new(
                FailureKind::Silence,
                format!(
                    "no sample reaches {} in {} samples",
                    self.thresholds.silence_threshold,
                    samples.len()
                ),
            ));
        }

        if is_clipped(samples, self.thresholds.clip_ceiling) {
            return AnalysisReport::failed(Failure::new(
                FailureKind::Clipped,
                format!(
                    "consecutive samples at or above {}",
                    self.thresholds.clip_ceiling
                ),
            ));
        }

        let (measurement, failures) = match self.measure(samples) {
            Ok(result) => result,
            Err(err) => {
                return AnalysisReport::failed(Failure::from_error(
                    FailureKind::MissedPrefix,
                    err,
                ));
            }
        };

        AnalysisReport {
            passed: failures.is_empty(),
            failures,
            measurement: Some(measurement),
        }
    }

    fn measure(&self, samples: &[f32]) -> Result<(Measurement, Vec<Failure>)> {
        let progress = self.progress.as_ref();

        progress.send_message("Aligning preamble");
        let alignment = locate_preamble(samples, &self.plan)?;
        progress.send_message(&format!(
            "Preamble found at sample {}",
            alignment.preamble_start
        ));

        progress.send_message("Analyzing noise floor");
        let noise = estimate_noise_floor(samples, &self.plan, alignment.preamble_start)?;

        let trial_power = measure_trials(samples, &self.plan, alignment.preamble_start, progress)?;

        let evaluation = evaluate(
            &trial_power,
            &noise.db,
            self.plan.frequencies(),
            &self.thresholds,
        )?;

        let measurement = Measurement {
            preamble_start: alignment.preamble_start,
            late_preamble: alignment.late,
            frequencies: self.plan.frequencies().to_vec(),
            noise_db: noise.db,
            mean_cv: evaluation.mean_cv,
            response_db: evaluation.response_db,
            signal_margin_db: evaluation.signal_margin_db,
            threshold_db: evaluation.threshold_db,
            band_average_db: evaluation.band_average_db,
            trial_power,
            noise_power: noise.power,
        };
        Ok((measurement, evaluation.failures))
    }
}
