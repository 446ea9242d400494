/// WAV decoding and encoding
use crate::error::{CheckError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::debug;

/// Mono samples normalized to `[-1.0, 1.0]`
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode a WAV file, keeping only the first channel
///
/// Integer PCM is scaled by `2^(bits - 1)`; float PCM is passed through.
pub fn read_recording(path: &Path) -> Result<Recording> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .step_by(channels)
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    if samples.is_empty() {
        return Err(CheckError::EmptyRecording);
    }

    debug!(
        path = %path.display(),
        channels = spec.channels,
        bits = spec.bits_per_sample,
        sample_rate = spec.sample_rate,
        frames = samples.len(),
        "Decoded recording"
    );

    Ok(Recording {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Write mono 32-bit float samples
pub fn write_stimulus(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

impl Recording {
    /// Fail unless the recording matches the plan's sample rate
    pub fn require_sample_rate(&self, expected: u32) -> Result<()> {
        if self.sample_rate == expected {
            Ok(())
        } else {
            Err(CheckError::SampleRateMismatch {
                expected,
                actual: self.sample_rate,
            })
        }
    }
}
