use super::TARGET_SAMPLE_RATE;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("Failed to decode WAV data: {0}")]
    Decode(#[from] hound::Error),
    #[error("Expected mono audio at {expected_rate} Hz, got {channels} channel(s) at {sample_rate} Hz")]
    UnexpectedFormat {
        channels: u16,
        sample_rate: u32,
        expected_rate: u32,
    },
    #[error("Audio contains no samples")]
    Empty,
}

/// Mono PCM samples in [-1, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Waveform {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Reads a WAV file that must already be mono at the analysis rate.
    /// Nothing is resampled or downmixed here.
    pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<Waveform, WaveformError> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels != 1 || spec.sample_rate != TARGET_SAMPLE_RATE {
            return Err(WaveformError::UnexpectedFormat {
                channels: spec.channels,
                sample_rate: spec.sample_rate,
                expected_rate: TARGET_SAMPLE_RATE,
            });
        }

        let samples = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        if samples.is_empty() {
            return Err(WaveformError::Empty);
        }
        Ok(Waveform::new(samples, spec.sample_rate))
    }

    /// Writes the waveform as 16-bit mono PCM.
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<(), WaveformError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }
}
