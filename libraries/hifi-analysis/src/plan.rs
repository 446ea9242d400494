//! Test plan: frequencies, timing, preamble, apodization window, playback order
//!
//! A [`TestPlan`] is immutable configuration data. It is either assembled from
//! explicit tables with [`TestPlan::new`] or materialized from the parametric
//! [`PlanConfig`] with [`TestPlan::from_config`]. Both paths validate the plan,
//! so an engine never sees a malformed one.
//!
//! # Playback order
//!
//! Pips are played in a scrambled order so a monotonic sweep cannot bias the
//! measurement. The order maps pip index (playback position) to a *cell*
//! `c = repetition * N + frequency_index`. [`PipOrder::seeded`] builds one
//! shuffled block per repetition, so every block plays each frequency once.

use crate::error::{AnalysisError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Period of the 10-bit maximal-length sequence used for the preamble
pub const MLS_PERIOD: usize = 1023;

/// Longest stimulus a plan may describe, alignment margin included
pub const MAX_PLAN_DURATION_S: f64 = 3600.0;

/// Largest number of test frequencies a plan may describe
pub const MAX_FREQUENCIES: usize = 100_000;

/// Convert a duration to a whole number of samples (rounded)
pub fn to_samples(seconds: f64, sample_rate: u32) -> usize {
    (seconds * f64::from(sample_rate)).round().max(0.0) as usize
}

/// Timing of the stimulus, all durations in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Sample rate of the recording in Hz
    pub sample_rate: u32,
    /// Length of one pip
    pub pip_duration_s: f64,
    /// Silence between consecutive pips
    pub pip_pause_s: f64,
    /// Length of the alignment preamble
    pub preamble_duration_s: f64,
    /// Silence before the preamble (noise is sampled here)
    pub pause_before_preamble_s: f64,
    /// Silence between the preamble and the first pip
    pub pause_after_preamble_s: f64,
    /// Extra slack allowed for playback/record start skew
    pub alignment_margin_s: f64,
}

impl Timing {
    fn validate(&self) -> Result<()> {
        if !(8000..=384000).contains(&self.sample_rate) {
            return Err(AnalysisError::InvalidSampleRate(self.sample_rate));
        }

        let positive = [
            ("pip_duration_s", self.pip_duration_s),
            ("preamble_duration_s", self.preamble_duration_s),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalysisError::InvalidTiming(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let non_negative = [
            ("pip_pause_s", self.pip_pause_s),
            ("pause_before_preamble_s", self.pause_before_preamble_s),
            ("pause_after_preamble_s", self.pause_after_preamble_s),
            ("alignment_margin_s", self.alignment_margin_s),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::InvalidTiming(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }

        for (name, value) in positive.iter().chain(&non_negative) {
            if *value > MAX_PLAN_DURATION_S {
                return Err(AnalysisError::InvalidTiming(format!(
                    "{name} of {value} s exceeds {MAX_PLAN_DURATION_S} s"
                )));
            }
        }

        Ok(())
    }

    /// Reject plans whose full stimulus would run past [`MAX_PLAN_DURATION_S`]
    fn check_duration(&self, frequencies: usize, repetitions: usize) -> Result<()> {
        let pips = frequencies as f64 * repetitions as f64;
        let duration = self.pause_before_preamble_s
            + self.preamble_duration_s
            + self.pause_after_preamble_s
            + self.alignment_margin_s
            + pips * (self.pip_duration_s + self.pip_pause_s);
        if duration > MAX_PLAN_DURATION_S {
            return Err(AnalysisError::InvalidTiming(format!(
                "{pips} pips make a {duration:.0} s stimulus, limit is {MAX_PLAN_DURATION_S} s"
            )));
        }
        Ok(())
    }

    /// Convert a duration to samples at this sample rate
    pub fn samples(&self, seconds: f64) -> usize {
        to_samples(seconds, self.sample_rate)
    }
}

/// Deterministic mapping from playback position to (frequency, repetition)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipOrder {
    cells: Vec<usize>,
    frequencies: usize,
    repetitions: usize,
}

impl PipOrder {
    /// Wrap an explicit order, checking that it is a bijection on `[0, N*R)`
    pub fn new(cells: Vec<usize>, frequencies: usize, repetitions: usize) -> Result<Self> {
        let expected = Self::cell_count(frequencies, repetitions)?;
        if cells.len() != expected {
            return Err(AnalysisError::OrderLengthMismatch {
                expected,
                actual: cells.len(),
            });
        }

        let mut seen = vec![false; expected];
        for &cell in &cells {
            match seen.get_mut(cell) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(AnalysisError::OrderNotPermutation(cell)),
            }
        }

        Ok(Self {
            cells,
            frequencies,
            repetitions,
        })
    }

    /// Build a block-shuffled order from a seed
    ///
    /// Each repetition block of `frequencies` pips is an independent shuffle of
    /// the frequency indices.
    pub fn seeded(frequencies: usize, repetitions: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cells = Vec::with_capacity(Self::cell_count(frequencies, repetitions)?);
        for rep in 0..repetitions {
            let mut block: Vec<usize> = (0..frequencies).collect();
            block.shuffle(&mut rng);
            cells.extend(block.into_iter().map(|f| rep * frequencies + f));
        }
        Ok(Self {
            cells,
            frequencies,
            repetitions,
        })
    }

    fn cell_count(frequencies: usize, repetitions: usize) -> Result<usize> {
        if frequencies == 0 {
            return Err(AnalysisError::EmptyFrequencies);
        }
        if repetitions == 0 {
            return Err(AnalysisError::InvalidRepetitions(repetitions));
        }
        frequencies.checked_mul(repetitions).ok_or_else(|| {
            AnalysisError::InvalidTiming(format!(
                "{frequencies} frequencies x {repetitions} repetitions overflows the pip count"
            ))
        })
    }

    /// Number of distinct test frequencies (`N`)
    pub fn frequencies(&self) -> usize {
        self.frequencies
    }

    /// Repetitions of each frequency (`R`)
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    /// Number of pips
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// `(frequency_index, repetition)` of the pip at playback position `pip`
    pub fn cell(&self, pip: usize) -> (usize, usize) {
        let c = self.cells[pip];
        (c % self.frequencies, c / self.frequencies)
    }

    /// Frequency index of the pip at playback position `pip`
    pub fn frequency_index(&self, pip: usize) -> usize {
        self.cell(pip).0
    }

    /// Raw cell numbers in playback order
    pub fn as_slice(&self) -> &[usize] {
        &self.cells
    }

    /// Iterate `(frequency_index, repetition)` in playback order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.cells.len()).map(|pip| self.cell(pip))
    }
}

/// Parametric description of the standard test plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub sample_rate: u32,
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
    pub frequency_step_hz: f64,
    pub repetitions: usize,
    pub noise_samples: usize,
    pub pip_duration_s: f64,
    pub pip_pause_s: f64,
    pub preamble_duration_s: f64,
    pub pause_before_preamble_s: f64,
    pub pause_after_preamble_s: f64,
    pub alignment_margin_s: f64,
    /// Number of preamble chips (one MLS period is 1023)
    pub preamble_chips: usize,
    /// Seed for the playback order shuffle
    pub order_seed: u64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            min_frequency_hz: 500.0,
            max_frequency_hz: 21000.0,
            frequency_step_hz: 100.0,
            repetitions: 5,
            noise_samples: 3,
            pip_duration_s: 0.004,
            pip_pause_s: 0.016,
            preamble_duration_s: 0.1,
            pause_before_preamble_s: 0.5,
            pause_after_preamble_s: 0.4,
            alignment_margin_s: 0.5,
            preamble_chips: MLS_PERIOD,
            order_seed: 1,
        }
    }
}

impl PlanConfig {
    fn timing(&self) -> Timing {
        Timing {
            sample_rate: self.sample_rate,
            pip_duration_s: self.pip_duration_s,
            pip_pause_s: self.pip_pause_s,
            preamble_duration_s: self.preamble_duration_s,
            pause_before_preamble_s: self.pause_before_preamble_s,
            pause_after_preamble_s: self.pause_after_preamble_s,
            alignment_margin_s: self.alignment_margin_s,
        }
    }

    /// Frequencies from `min` to `max` inclusive in `step` increments
    pub fn frequencies(&self) -> Result<Vec<f64>> {
        if !self.frequency_step_hz.is_finite() || self.frequency_step_hz <= 0.0 {
            return Err(AnalysisError::InvalidTiming(format!(
                "frequency_step_hz must be positive, got {}",
                self.frequency_step_hz
            )));
        }
        if !(self.min_frequency_hz.is_finite() && self.max_frequency_hz.is_finite())
            || self.max_frequency_hz < self.min_frequency_hz
        {
            return Err(AnalysisError::EmptyFrequencies);
        }

        // Half a step of slack so float accumulation never drops the endpoint
        let steps = ((self.max_frequency_hz - self.min_frequency_hz) / self.frequency_step_hz
            + 0.5)
            .floor();
        if steps >= MAX_FREQUENCIES as f64 {
            return Err(AnalysisError::InvalidTiming(format!(
                "frequency_step_hz {} gives more than {MAX_FREQUENCIES} frequencies",
                self.frequency_step_hz
            )));
        }
        let count = steps as usize + 1;
        Ok((0..count)
            .map(|i| self.min_frequency_hz + i as f64 * self.frequency_step_hz)
            .collect())
    }
}

/// Immutable test plan consumed by the analysis engine
#[derive(Debug, Clone)]
pub struct TestPlan {
    timing: Timing,
    frequencies: Vec<f64>,
    repetitions: usize,
    noise_samples: usize,
    order: PipOrder,
    preamble: Vec<f64>,
    window: Vec<f64>,
}

impl TestPlan {
    /// Assemble a plan from explicit tables
    ///
    /// # Errors
    /// Rejects empty or unsorted frequency lists, zero repetition or noise
    /// counts, bad timing, empty/non-finite window or preamble, and an order
    /// that is not a permutation of `[0, N*R)`.
    pub fn new(
        timing: Timing,
        frequencies: Vec<f64>,
        repetitions: usize,
        noise_samples: usize,
        order: Vec<usize>,
        preamble: Vec<f64>,
        window: Vec<f64>,
    ) -> Result<Self> {
        timing.validate()?;

        if frequencies.is_empty() {
            return Err(AnalysisError::EmptyFrequencies);
        }
        for (i, &f) in frequencies.iter().enumerate() {
            let ascending = i == 0 || f > frequencies[i - 1];
            if !f.is_finite() || f <= 0.0 || !ascending {
                return Err(AnalysisError::UnsortedFrequencies(i));
            }
        }
        if repetitions == 0 {
            return Err(AnalysisError::InvalidRepetitions(repetitions));
        }
        if noise_samples == 0 {
            return Err(AnalysisError::InvalidNoiseSamples(noise_samples));
        }
        if window.is_empty() {
            return Err(AnalysisError::InvalidWindow("window is empty".to_string()));
        }
        if window.iter().any(|w| !w.is_finite()) {
            return Err(AnalysisError::InvalidWindow(
                "window has non-finite coefficients".to_string(),
            ));
        }
        if preamble.is_empty() || preamble.iter().any(|s| !s.is_finite()) {
            return Err(AnalysisError::EmptyPreamble);
        }

        timing.check_duration(frequencies.len(), repetitions)?;
        let max_preroll = timing.samples(MAX_PLAN_DURATION_S) as f64;
        if noise_samples as f64 * window.len() as f64 > max_preroll {
            return Err(AnalysisError::InvalidNoiseSamples(noise_samples));
        }

        let order = PipOrder::new(order, frequencies.len(), repetitions)?;

        Ok(Self {
            timing,
            frequencies,
            repetitions,
            noise_samples,
            order,
            preamble,
            window,
        })
    }

    /// Materialize the standard plan described by `config`
    pub fn from_config(config: &PlanConfig) -> Result<Self> {
        let timing = config.timing();
        timing.validate()?;
        let frequencies = config.frequencies()?;
        let preamble_len = timing.samples(timing.preamble_duration_s);
        if config.preamble_chips == 0 {
            return Err(AnalysisError::EmptyPreamble);
        }
        if config.preamble_chips > preamble_len {
            return Err(AnalysisError::InvalidTiming(format!(
                "{} preamble chips do not fit in {preamble_len} samples",
                config.preamble_chips
            )));
        }
        timing.check_duration(frequencies.len(), config.repetitions)?;

        let window = hann(timing.samples(timing.pip_duration_s));
        let preamble = mls_preamble(config.preamble_chips, preamble_len);
        let order = PipOrder::seeded(frequencies.len(), config.repetitions, config.order_seed)?;

        Self::new(
            timing,
            frequencies,
            config.repetitions,
            config.noise_samples,
            order.cells,
            preamble,
            window,
        )
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn sample_rate(&self) -> u32 {
        self.timing.sample_rate
    }

    /// Test frequencies in ascending order
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn noise_samples(&self) -> usize {
        self.noise_samples
    }

    pub fn order(&self) -> &PipOrder {
        &self.order
    }

    /// Reference preamble waveform
    pub fn preamble(&self) -> &[f64] {
        &self.preamble
    }

    /// Apodization window (its length is the measurement window length)
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn preamble_len(&self) -> usize {
        self.preamble.len()
    }

    /// Total number of pips (`N * R`)
    pub fn pip_count(&self) -> usize {
        self.order.len()
    }

    /// Frequency of the pip at playback position `pip`
    pub fn playback_frequency(&self, pip: usize) -> f64 {
        self.frequencies[self.order.frequency_index(pip)]
    }

    /// Samples from the preamble's first sample to the end of its trailing pause
    pub fn preamble_span_len(&self) -> usize {
        self.preamble.len() + self.timing.samples(self.timing.pause_after_preamble_s)
    }

    /// Offset in samples from the preamble start to the start of pip `pip`
    pub fn pip_offset(&self, pip: usize) -> usize {
        let spacing = self.timing.pip_duration_s + self.timing.pip_pause_s;
        self.preamble_span_len() + self.timing.samples(pip as f64 * spacing)
    }

    /// Recording length that must hold the preamble for alignment
    pub fn alignment_span_len(&self) -> usize {
        let t = &self.timing;
        t.samples(
            t.preamble_duration_s
                + t.pause_before_preamble_s
                + t.pause_after_preamble_s
                + t.alignment_margin_s,
        )
    }

    /// Latest physically plausible preamble start
    pub fn max_preamble_start(&self) -> usize {
        let t = &self.timing;
        t.samples(t.pause_before_preamble_s + t.alignment_margin_s)
    }
}

/// Symmetric Hann window of `len` samples
pub fn hann(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (len - 1) as f64;
            (0..len)
                .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / denom).cos())
                .collect()
        }
    }
}

/// ±1 maximal-length sequence (recurrence `s[n+10] = s[n] ^ s[n+3]`), period [`MLS_PERIOD`]
pub fn mls_chips(chips: usize) -> Vec<f64> {
    let mut state: u16 = 0x3FF;
    (0..chips)
        .map(|_| {
            let out = if state & 1 == 1 { 1.0 } else { -1.0 };
            let feedback = (state ^ (state >> 3)) & 1;
            state = (state >> 1) | (feedback << 9);
            out
        })
        .collect()
}

/// Preamble waveform: `chips` MLS chips held across `len` samples
pub fn mls_preamble(chips: usize, len: usize) -> Vec<f64> {
    let code = mls_chips(chips);
    if code.is_empty() {
        return Vec::new();
    }
    (0..len).map(|n| code[n * code.len() / len]).collect()
}
