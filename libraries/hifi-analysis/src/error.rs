//! Error types for frequency-response analysis

use thiserror::Error;

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur while building or running the analysis engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Test frequency list is empty
    #[error("Test plan has no frequencies")]
    EmptyFrequencies,

    /// Test frequencies must be strictly increasing and positive
    #[error("Test frequencies must be positive and strictly increasing (index {0})")]
    UnsortedFrequencies(usize),

    /// Repetition count is zero
    #[error("Invalid repetition count: {0} (must be at least 1)")]
    InvalidRepetitions(usize),

    /// Noise sample count is zero
    #[error("Invalid noise sample count: {0} (must be at least 1)")]
    InvalidNoiseSamples(usize),

    /// Invalid sample rate
    #[error("Invalid sample rate: {0} Hz (must be between 8000 and 384000)")]
    InvalidSampleRate(u32),

    /// A duration in the timing block is negative, zero where it must not be, or not finite
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Apodization window is empty or does not match the pip length
    #[error("Invalid apodization window: {0}")]
    InvalidWindow(String),

    /// Preamble waveform is empty
    #[error("Preamble waveform is empty")]
    EmptyPreamble,

    /// Playback order has the wrong number of entries
    #[error("Playback order has {actual} entries, expected {expected}")]
    OrderLengthMismatch { expected: usize, actual: usize },

    /// Playback order is not a bijection on [0, N*R)
    #[error("Playback order is not a permutation: cell {0} is out of range or repeated")]
    OrderNotPermutation(usize),

    /// Inputs handed to a measurement stage disagree in length
    #[error("Length mismatch in {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A threshold is out of its valid range
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    /// Recording is shorter than the preamble
    #[error("Insufficient data: {available} samples, preamble needs {required}")]
    InsufficientData { required: usize, available: usize },

    /// Not enough audio before the preamble to sample the noise floor
    #[error("Insufficient pre-roll: preamble starts at sample {preamble_start}, noise windows need {required}")]
    InsufficientPreroll {
        preamble_start: usize,
        required: usize,
    },

    /// Recording ends before the last expected pip window
    #[error("Truncated recording: pip {pip} needs samples up to {required}, recording has {available}")]
    TruncatedRecording {
        pip: usize,
        required: usize,
        available: usize,
    },
}

impl AnalysisError {
    /// Whether this error describes the recording rather than the configuration
    ///
    /// Recording failures become a failed verdict; configuration failures are
    /// rejected when the engine is constructed.
    pub fn is_recording_failure(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. }
                | Self::InsufficientPreroll { .. }
                | Self::TruncatedRecording { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_failures_are_distinguished() {
        assert!(AnalysisError::InsufficientData {
            required: 10,
            available: 2
        }
        .is_recording_failure());
        assert!(AnalysisError::TruncatedRecording {
            pip: 3,
            required: 100,
            available: 50
        }
        .is_recording_failure());
        assert!(!AnalysisError::EmptyFrequencies.is_recording_failure());
        assert!(!AnalysisError::OrderNotPermutation(4).is_recording_failure());
        assert!(!AnalysisError::LengthMismatch {
            what: "noise floor",
            expected: 3,
            actual: 2
        }
        .is_recording_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = AnalysisError::InsufficientPreroll {
            preamble_start: 12,
            required: 577,
        };
        assert!(err.to_string().contains("577"));
    }
}
