//! Test doubles and fixture data
//!
//! ffmpeg and a microphone are not available in CI, so uploads and recordings
//! go through fakes that produce a short tone at the analysis sample rate.

use super::constants::*;
use anyhow::Result;
use async_trait::async_trait;
use genre_prediction_server::audio::{
    AudioCapture, AudioTranscoder, CaptureError, CaptureRequest, ConversionError, Waveform,
    TARGET_SAMPLE_RATE,
};
use genre_prediction_server::classifier::GenreClassifier;
use genre_prediction_server::store::SqliteStore;
use genre_prediction_server::user::UserManager;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Bytes that only need to get past the extension and size checks.
pub const FAKE_UPLOAD_BYTES: &[u8] = b"not really audio, the fake transcoder ignores it";

pub fn tone(seconds: f32, frequency: f32) -> Waveform {
    let frames = (seconds * TARGET_SAMPLE_RATE as f32) as usize;
    let samples = (0..frames)
        .map(|i| {
            let t = i as f32 / TARGET_SAMPLE_RATE as f32;
            0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect();
    Waveform::new(samples, TARGET_SAMPLE_RATE)
}

/// Ignores the input and writes a tone where ffmpeg would write its output.
#[derive(Default)]
pub struct ToneTranscoder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AudioTranscoder for ToneTranscoder {
    async fn transcode_to_wav(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        if !input.exists() {
            return Err(ConversionError::ConversionFailed(format!(
                "staged upload {:?} is missing",
                input
            )));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        tone(FIXTURE_CLIP_SECONDS, 440.0)
            .write_wav(output)
            .map_err(|e| ConversionError::ConversionFailed(e.to_string()))
    }
}

/// A capture device that records a tone instantly.
pub struct ToneCapture;

impl AudioCapture for ToneCapture {
    fn capture_blocking(
        &self,
        request: &CaptureRequest,
        cancel: &CancellationToken,
    ) -> Result<Waveform, CaptureError> {
        if cancel.is_cancelled() {
            return Err(CaptureError::Cancelled);
        }
        let seconds = request.duration.as_secs_f32().min(FIXTURE_CLIP_SECONDS);
        Ok(tone(seconds, 220.0))
    }
}

/// Zero weights with a large intercept on the first class, so every clip is
/// predicted as [`PREDICTED_GENRE`].
pub fn fixture_classifier() -> Result<GenreClassifier> {
    let n_features = 15;
    let json = serde_json::json!({
        "classes": CLASSIFIER_CLASSES,
        "n_features": n_features,
        "model": {
            "type": "logistic_regression",
            "coefficients": vec![vec![0.0; n_features]; CLASSIFIER_CLASSES.len()],
            "intercepts": [4.0, 0.0, 0.0]
        }
    });
    Ok(GenreClassifier::from_json(&json.to_string())?)
}

/// Seeds the two test users.
pub fn create_test_users(store: Arc<SqliteStore>) -> Result<()> {
    let user_manager = UserManager::new(store);
    user_manager.add_user_with_password(TEST_USER, TEST_EMAIL, TEST_PASS)?;
    user_manager.add_user_with_password(OTHER_USER, OTHER_EMAIL, OTHER_PASS)?;
    Ok(())
}
