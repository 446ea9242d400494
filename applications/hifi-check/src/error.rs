/// CLI error types
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckError>;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Recording is {actual} Hz but the test plan expects {expected} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("Recording contains no samples")]
    EmptyRecording,

    #[error("Analysis setup error: {0}")]
    Analysis(#[from] hifi_analysis::AnalysisError),
}

impl From<config::ConfigError> for CheckError {
    fn from(err: config::ConfigError) -> Self {
        CheckError::Config(err.to_string())
    }
}
