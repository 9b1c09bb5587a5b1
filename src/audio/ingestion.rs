use super::{
    AudioTranscoder, CaptureError, ConversionError, FeatureError, Waveform, WaveformError,
};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

pub const UNSUPPORTED_FORMAT_MESSAGE: &str =
    "Invalid file format. Please upload .webm, .mp3, or .wav files.";

/// Problems with what the user sent; reported back verbatim.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid file format. Please upload .webm, .mp3, or .wav files.")]
    UnsupportedFormat,
    #[error("File is too large, the limit is {limit} bytes.")]
    TooLarge { limit: usize },
    #[error("The uploaded file is empty.")]
    EmptyUpload,
}

/// Anything that went wrong turning accepted input into features.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Error processing audio file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error processing audio file: {0}")]
    Conversion(#[from] ConversionError),
    #[error("Error processing audio file: {0}")]
    Waveform(#[from] WaveformError),
    #[error("Error recording audio: {0}")]
    Capture(#[from] CaptureError),
    #[error("Error extracting features: {0}")]
    Features(#[from] FeatureError),
    #[error("Error processing audio file: worker task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Webm,
    Mp3,
    Wav,
}

impl UploadFormat {
    /// Only the suffix is looked at, ignoring case.
    pub fn from_filename(filename: &str) -> Result<UploadFormat, ValidationError> {
        let filename = filename.to_ascii_lowercase();
        [UploadFormat::Webm, UploadFormat::Mp3, UploadFormat::Wav]
            .into_iter()
            .find(|format| {
                filename
                    .strip_suffix(format.extension())
                    .is_some_and(|stem| stem.ends_with('.'))
            })
            .ok_or(ValidationError::UnsupportedFormat)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            UploadFormat::Webm => "webm",
            UploadFormat::Mp3 => "mp3",
            UploadFormat::Wav => "wav",
        }
    }
}

#[derive(Debug)]
pub struct IngestedClip {
    pub format: UploadFormat,
    pub waveform: Waveform,
}

fn scratch_file(scratch_dir: &Path, prefix: &str, extension: &str) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(&format!(".{}", extension))
        .tempfile_in(scratch_dir)
}

/// Stages the upload on disk, transcodes it and loads the result. Both
/// scratch files are removed when this returns, whatever the outcome.
pub async fn ingest_upload(
    format: UploadFormat,
    bytes: &[u8],
    scratch_dir: Option<&Path>,
    transcoder: &dyn AudioTranscoder,
) -> Result<IngestedClip, ProcessingError> {
    let scratch_dir: PathBuf = scratch_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    tokio::fs::create_dir_all(&scratch_dir).await?;

    let source = scratch_file(&scratch_dir, "upload-", format.extension())?;
    tokio::fs::write(source.path(), bytes).await?;
    let converted = scratch_file(&scratch_dir, "converted-", "wav")?;

    debug!(
        "Transcoding {} byte {:?} upload {:?} -> {:?}",
        bytes.len(),
        format,
        source.path(),
        converted.path()
    );
    transcoder
        .transcode_to_wav(source.path(), converted.path())
        .await?;

    let converted_path = converted.path().to_path_buf();
    let waveform = tokio::task::spawn_blocking(move || Waveform::read_wav(converted_path))
        .await
        .map_err(|e| ProcessingError::Task(e.to_string()))??;

    drop(source);
    drop(converted);
    Ok(IngestedClip { format, waveform })
}
