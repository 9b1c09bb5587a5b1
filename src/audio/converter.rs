//! Bringing arbitrary uploads to mono WAV at the analysis rate via ffmpeg.

use super::TARGET_SAMPLE_RATE;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("ffmpeg failed: {0}")]
    ConversionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg not available: {0}")]
    Unavailable(String),
}

/// Decodes `input` (any container ffmpeg understands) and writes a mono
/// 16-bit WAV at [`TARGET_SAMPLE_RATE`] to `output`.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn transcode_to_wav(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        FfmpegTranscoder {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Runs `ffmpeg -version` once, so a missing binary shows up at startup
    /// rather than on the first upload.
    pub async fn check_available(&self) -> Result<(), ConversionError> {
        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ConversionError::Unavailable(format!("{}: {}", self.ffmpeg_path, e)))?;
        if !status.success() {
            return Err(ConversionError::Unavailable(format!(
                "{} exited with {}",
                self.ffmpeg_path, status
            )));
        }
        Ok(())
    }

    fn arguments(input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        let rate = TARGET_SAMPLE_RATE.to_string();
        let mut args: Vec<std::ffi::OsString> = vec!["-y".into(), "-i".into()];
        args.push(input.as_os_str().to_owned());
        for arg in ["-vn", "-ac", "1", "-ar", rate.as_str(), "-c:a", "pcm_s16le"] {
            args.push(arg.into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn transcode_to_wav(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output_status = Command::new(&self.ffmpeg_path)
            .args(Self::arguments(input, output))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            return Err(ConversionError::ConversionFailed(stderr.trim().to_string()));
        }

        Ok(())
    }
}
