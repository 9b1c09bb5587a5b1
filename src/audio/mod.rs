//! Everything between an uploaded or captured clip and a feature vector.

pub mod capture;
mod converter;
mod features;
mod ingestion;
mod mel;
mod waveform;

/// Rate every clip is brought to before analysis.
pub const TARGET_SAMPLE_RATE: u32 = 22_050;

pub use capture::{AudioCapture, CaptureError, CaptureRequest, UnavailableCapture};
pub use converter::{AudioTranscoder, ConversionError, FfmpegTranscoder};
pub use features::{
    FeatureError, FeatureExtractor, FeatureVector, FEATURE_LENGTH, HOP_LENGTH, N_FFT, N_MELS,
    N_MFCC,
};
pub use ingestion::{
    ingest_upload, IngestedClip, ProcessingError, UploadFormat, ValidationError,
    UNSUPPORTED_FORMAT_MESSAGE,
};
pub use waveform::{Waveform, WaveformError};
