//! Per-pip power measurement and de-scrambling into the power matrix
//!
//! Pips are measured in playback order, each at its own playback frequency,
//! then routed through the plan's [`PipOrder`] into `matrix[frequency][repetition]`.

use crate::error::{AnalysisError, Result};
use crate::plan::{PipOrder, TestPlan};
use crate::progress::ProgressSink;
use crate::tone::{apply_window, tone_power};
use serde::Serialize;
use tracing::debug;

/// `N x R` grid of raw (linear) power values, one per (frequency, repetition)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerMatrix {
    frequencies: usize,
    repetitions: usize,
    /// Row-major: `cells[f * repetitions + r]`
    cells: Vec<f64>,
}

impl PowerMatrix {
    /// Route measurements taken in playback order into their cells
    ///
    /// `measurements[i]` belongs to the pip at playback position `i`. Every cell
    /// is written exactly once because `order` is a bijection.
    ///
    /// # Errors
    /// [`AnalysisError::LengthMismatch`] unless there is one measurement per pip.
    pub fn from_playback(order: &PipOrder, measurements: &[f64]) -> Result<Self> {
        if measurements.len() != order.len() {
            return Err(AnalysisError::LengthMismatch {
                what: "playback measurements",
                expected: order.len(),
                actual: measurements.len(),
            });
        }

        let repetitions = order.repetitions();
        let mut cells = vec![f64::NAN; order.len()];
        for (pip, &power) in measurements.iter().enumerate() {
            let (f, r) = order.cell(pip);
            cells[f * repetitions + r] = power;
        }
        Ok(Self {
            frequencies: order.frequencies(),
            repetitions,
            cells,
        })
    }

    /// Build directly from rows, one row of `R` trials per frequency
    ///
    /// # Errors
    /// [`AnalysisError::LengthMismatch`] if the rows differ in length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let repetitions = rows.first().map_or(0, Vec::len);
        if let Some(ragged) = rows.iter().find(|r| r.len() != repetitions) {
            return Err(AnalysisError::LengthMismatch {
                what: "trial rows",
                expected: repetitions,
                actual: ragged.len(),
            });
        }
        Ok(Self {
            frequencies: rows.len(),
            repetitions,
            cells: rows.concat(),
        })
    }

    pub fn frequencies(&self) -> usize {
        self.frequencies
    }

    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn get(&self, frequency: usize, repetition: usize) -> f64 {
        self.cells[frequency * self.repetitions + repetition]
    }

    /// All trials for one frequency
    pub fn row(&self, frequency: usize) -> &[f64] {
        let start = frequency * self.repetitions;
        &self.cells[start..start + self.repetitions]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.cells.chunks(self.repetitions.max(1))
    }
}

/// Measure every pip after a preamble starting at `preamble_start`
///
/// # Errors
/// [`AnalysisError::TruncatedRecording`] if any pip window runs past the end
/// of `samples`; nothing is returned in that case.
pub fn measure_trials(
    samples: &[f32],
    plan: &TestPlan,
    preamble_start: usize,
    progress: &dyn ProgressSink,
) -> Result<PowerMatrix> {
    let window = plan.window();
    let w = window.len();
    let n = plan.frequencies().len();
    let r = plan.repetitions();
    let pip_count = plan.pip_count();

    // Checked up front so a short recording never yields partial work
    if let Some(last) = pip_count.checked_sub(1) {
        let required = preamble_start + plan.pip_offset(last) + w;
        if required > samples.len() {
            let first_missing = (0..pip_count)
                .find(|&pip| preamble_start + plan.pip_offset(pip) + w > samples.len())
                .unwrap_or(last);
            return Err(AnalysisError::TruncatedRecording {
                pip: first_missing,
                required,
                available: samples.len(),
            });
        }
    }

    let mut measurements = Vec::with_capacity(pip_count);
    for pip in 0..pip_count {
        if pip % n == 0 {
            progress.send_message(&format!("Measuring trial group {}/{}", pip / n + 1, r));
        }
        let start = preamble_start + plan.pip_offset(pip);
        let windowed = apply_window(&samples[start..start + w], window);
        measurements.push(tone_power(
            &windowed,
            plan.playback_frequency(pip),
            plan.sample_rate(),
        ));
    }

    debug!(pips = pip_count, "Trial powers measured");
    PowerMatrix::from_playback(plan.order(), &measurements)
}
