//! Frequency-response verification for HiFi Check
//!
//! This crate analyzes one recording of a known stimulus (an alignment
//! preamble followed by single-tone pips played in a scrambled order) and
//! decides whether the device under test reproduces the band cleanly:
//! - Preamble alignment by FFT cross-correlation
//! - Noise floor from the silence before the preamble
//! - Per-pip tone power, de-scrambled into a frequency x repetition matrix
//! - Pass/fail gates: silence, clipping, missed prefix, trial consistency,
//!   NaN, signal above noise, high-frequency roll-off
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────────┐
//! │ Recording   │ ──► │  Alignment   │ ──► │  Noise floor   │ ──┐
//! └─────────────┘     └──────────────┘     ├────────────────┤   │   ┌───────────┐
//!                                          │  Trial powers  │ ──┴─► │   Gates   │ ──► AnalysisReport
//!                                          └────────────────┘       └───────────┘
//! ```
//!
//! The engine does no I/O. Decoding audio, capturing it and presenting the
//! report belong to the caller.
//!
//! # Example
//!
//! ```
//! use hifi_analysis::{render_stimulus, FrequencyResponseAnalyzer, PlanConfig, Thresholds};
//!
//! let config = PlanConfig {
//!     min_frequency_hz: 1000.0,
//!     max_frequency_hz: 20000.0,
//!     frequency_step_hz: 500.0,
//!     repetitions: 3,
//!     ..PlanConfig::default()
//! };
//! let analyzer = FrequencyResponseAnalyzer::from_config(&config, Thresholds::default())?;
//!
//! // A perfect loopback: the recording is the stimulus itself plus a faint hiss
//! let mut recording = render_stimulus(analyzer.plan(), 0.5);
//! for (i, s) in recording.iter_mut().enumerate() {
//!     *s += if i % 2 == 0 { 1e-4 } else { -1e-4 };
//! }
//!
//! let report = analyzer.analyze(&recording);
//! assert!(report.passed(), "{report}");
//! println!("Threshold: {:.1} dB", report.threshold_db().unwrap());
//! # Ok::<(), hifi_analysis::AnalysisError>(())
//! ```

#![deny(unsafe_code)]

mod align;
mod analyzer;
mod decision;
mod error;
mod noise;
mod plan;
mod progress;
mod stats;
mod stimulus;
mod tone;
mod trials;

pub use align::{cross_correlate, locate_preamble, Alignment};
pub use analyzer::{AnalysisReport, FrequencyResponseAnalyzer, Measurement};
pub use decision::{
    evaluate, is_clipped, is_silence, mean_coefficient_of_variation, response_db, Evaluation,
    Failure, FailureKind, Thresholds,
};
pub use error::{AnalysisError, Result};
pub use noise::{estimate_noise_floor, required_preroll, NoiseFloor, NOISE_GUARD_SAMPLES};
pub use plan::{
    hann, mls_chips, mls_preamble, to_samples, PipOrder, PlanConfig, TestPlan, Timing,
    MAX_FREQUENCIES, MAX_PLAN_DURATION_S, MLS_PERIOD,
};
pub use progress::{NoProgress, ProgressSink};
pub use stats::{closest_index, coefficient_of_variation, mean, median, power_to_db, std_dev};
pub use stimulus::render_stimulus;
pub use tone::{apply_window, tone_power};
pub use trials::{measure_trials, PowerMatrix};
