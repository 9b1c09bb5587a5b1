use crate::audio::{
    capture::capture_clip, ingest_upload, AudioCapture, AudioTranscoder, CaptureRequest,
    FeatureExtractor, ProcessingError, UploadFormat, ValidationError, Waveform,
};
use crate::classifier::{ClassifierError, GenreClassifier};
use crate::config::AudioSettings;
use crate::genre::{FullStore, NewPrediction, Prediction};
use crate::server::metrics;
use chrono::{DateTime, Datelike, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Directory under the media root where classified clips are kept.
const ARCHIVE_DIR: &str = "predictions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionSource {
    Upload,
    Recording,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::Upload => "upload",
            PredictionSource::Recording => "recording",
        }
    }
}

/// Validation and processing errors are shown to the user and the request
/// completes; fatal errors end the request with a server error.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
    #[error("Prediction failed: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl From<ClassifierError> for PredictionError {
    fn from(err: ClassifierError) -> Self {
        PredictionError::Fatal(err.into())
    }
}

impl PredictionError {
    fn outcome_label(&self) -> &'static str {
        match self {
            PredictionError::Validation(_) => "validation_error",
            PredictionError::Processing(_) => "processing_error",
            PredictionError::Fatal(_) => "fatal",
        }
    }
}

pub struct PredictionService {
    classifier: Arc<GenreClassifier>,
    extractor: Arc<FeatureExtractor>,
    store: Arc<dyn FullStore>,
    transcoder: Arc<dyn AudioTranscoder>,
    capture: Arc<dyn AudioCapture>,
    settings: AudioSettings,
    media_dir: PathBuf,
}

impl PredictionService {
    pub fn new(
        classifier: Arc<GenreClassifier>,
        store: Arc<dyn FullStore>,
        transcoder: Arc<dyn AudioTranscoder>,
        capture: Arc<dyn AudioCapture>,
        settings: AudioSettings,
        media_dir: PathBuf,
    ) -> Self {
        PredictionService {
            classifier,
            extractor: Arc::new(FeatureExtractor::new()),
            store,
            transcoder,
            capture,
            settings,
            media_dir,
        }
    }

    pub fn classifier(&self) -> &GenreClassifier {
        &self.classifier
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.settings.max_upload_bytes
    }

    /// Validates, transcodes and classifies an uploaded file.
    pub async fn predict_upload(
        &self,
        user_id: usize,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Prediction, PredictionError> {
        let start = Instant::now();
        let result = self.run_upload(user_id, filename, bytes).await;
        self.finish(PredictionSource::Upload, start, result)
    }

    /// Records from the local input device and classifies the clip.
    pub async fn predict_recording(&self, user_id: usize) -> Result<Prediction, PredictionError> {
        let start = Instant::now();
        let request = CaptureRequest::new(
            self.settings.capture_duration,
            self.settings.capture_timeout_grace,
        );
        let result = match capture_clip(self.capture.clone(), request).await {
            Ok(waveform) => self.classify(user_id, waveform, "recording.wav").await,
            Err(err) => Err(ProcessingError::from(err).into()),
        };
        self.finish(PredictionSource::Recording, start, result)
    }

    async fn run_upload(
        &self,
        user_id: usize,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Prediction, PredictionError> {
        let format = UploadFormat::from_filename(filename)?;
        if bytes.is_empty() {
            return Err(ValidationError::EmptyUpload.into());
        }
        if bytes.len() > self.settings.max_upload_bytes {
            return Err(ValidationError::TooLarge {
                limit: self.settings.max_upload_bytes,
            }
            .into());
        }

        let clip = ingest_upload(
            format,
            bytes,
            self.settings.scratch_dir.as_deref(),
            self.transcoder.as_ref(),
        )
        .await?;
        self.classify(user_id, clip.waveform, filename).await
    }

    async fn classify(
        &self,
        user_id: usize,
        waveform: Waveform,
        original_name: &str,
    ) -> Result<Prediction, PredictionError> {
        let extractor = self.extractor.clone();
        let (waveform, features) = tokio::task::spawn_blocking(move || {
            let features = extractor.extract(&waveform);
            (waveform, features)
        })
        .await
        .map_err(|e| ProcessingError::Task(e.to_string()))?;
        let features = features.map_err(ProcessingError::from)?.to_vec();

        let guess = self.classifier.predict(&features)?;

        let created = Utc::now();
        let audio_file = if self.settings.archive_clips {
            self.archive(waveform, created).await?
        } else {
            original_name.to_string()
        };

        let genre = self
            .store
            .get_or_create_genre(&guess.label)
            .map_err(PredictionError::Fatal)?;
        let prediction = self
            .store
            .record_prediction(&NewPrediction {
                user_id,
                audio_file,
                genre_id: genre.id,
                confidence: guess.confidence,
                features,
                created,
            })
            .map_err(PredictionError::Fatal)?;
        metrics::record_predicted_genre(&prediction.genre_name);
        Ok(prediction)
    }

    /// Writes the clip under `predictions/YYYY/MM/DD/` and returns the path
    /// relative to the media directory.
    async fn archive(
        &self,
        waveform: Waveform,
        created: DateTime<Utc>,
    ) -> Result<String, ProcessingError> {
        let relative = format!(
            "{}/{:04}/{:02}/{:02}/{}.wav",
            ARCHIVE_DIR,
            created.year(),
            created.month(),
            created.day(),
            uuid::Uuid::new_v4()
        );
        let path = self.media_dir.join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::task::spawn_blocking(move || waveform.write_wav(path))
            .await
            .map_err(|e| ProcessingError::Task(e.to_string()))??;
        Ok(relative)
    }

    fn finish(
        &self,
        source: PredictionSource,
        start: Instant,
        result: Result<Prediction, PredictionError>,
    ) -> Result<Prediction, PredictionError> {
        let elapsed = start.elapsed();
        match &result {
            Ok(prediction) => {
                info!(
                    "Predicted {} ({:.1}%) for user {} from {} in {:?}",
                    prediction.genre_name,
                    prediction.confidence,
                    prediction.user_id,
                    source.as_str(),
                    elapsed
                );
                metrics::record_prediction(source.as_str(), "success", elapsed);
            }
            Err(err) => {
                match err {
                    PredictionError::Validation(e) => info!("Rejected {}: {}", source.as_str(), e),
                    PredictionError::Processing(e) => warn!("{} failed: {}", source.as_str(), e),
                    PredictionError::Fatal(e) => error!("{} failed fatally: {:#}", source.as_str(), e),
                }
                metrics::record_prediction(source.as_str(), err.outcome_label(), elapsed);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CaptureError, ConversionError, TARGET_SAMPLE_RATE};
    use crate::genre::{GenreStore, PredictionStore};
    use crate::store::SqliteStore;
    use crate::user::UserStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct ToneTranscoder;

    #[async_trait]
    impl AudioTranscoder for ToneTranscoder {
        async fn transcode_to_wav(&self, _: &Path, output: &Path) -> Result<(), ConversionError> {
            Waveform::new(tone(0.5), TARGET_SAMPLE_RATE)
                .write_wav(output)
                .map_err(|e| ConversionError::ConversionFailed(e.to_string()))
        }
    }

    struct BrokenTranscoder;

    #[async_trait]
    impl AudioTranscoder for BrokenTranscoder {
        async fn transcode_to_wav(&self, _: &Path, _: &Path) -> Result<(), ConversionError> {
            Err(ConversionError::ConversionFailed("moov atom not found".to_string()))
        }
    }

    struct ToneCapture;

    impl crate::audio::AudioCapture for ToneCapture {
        fn capture_blocking(
            &self,
            request: &CaptureRequest,
            _: &CancellationToken,
        ) -> Result<Waveform, CaptureError> {
            Ok(Waveform::new(
                tone(request.duration.as_secs_f64()),
                request.sample_rate,
            ))
        }
    }

    fn tone(seconds: f64) -> Vec<f32> {
        let n = (seconds * TARGET_SAMPLE_RATE as f64) as usize;
        (0..n)
            .map(|i| (0.3 * (i as f64 * 0.2).sin()) as f32)
            .collect()
    }

    fn classifier(n_features: usize) -> Arc<GenreClassifier> {
        Arc::new(
            GenreClassifier::from_json(
                &json!({
                    "classes": ["blues", "rock"],
                    "n_features": n_features,
                    "model": {
                        "type": "logistic_regression",
                        "coefficients": [vec![0.0; n_features], vec![0.0; n_features]],
                        "intercepts": [1.0, 0.0]
                    }
                })
                .to_string(),
            )
            .unwrap(),
        )
    }

    struct Fixture {
        _dir: TempDir,
        media_dir: PathBuf,
        store: Arc<SqliteStore>,
        user_id: usize,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = Arc::new(SqliteStore::new(dir.path().join("test.db")).unwrap());
            let user_id = store.create_user("listener", "listener@example.com").unwrap();
            Fixture {
                media_dir: dir.path().join("media"),
                _dir: dir,
                store,
                user_id,
            }
        }

        fn service(
            &self,
            classifier: Arc<GenreClassifier>,
            transcoder: Arc<dyn AudioTranscoder>,
            capture: Arc<dyn AudioCapture>,
        ) -> PredictionService {
            let settings = AudioSettings {
                capture_duration: Duration::from_secs(1),
                capture_timeout_grace: Duration::from_secs(5),
                max_upload_bytes: 1024,
                scratch_dir: Some(self.media_dir.join("scratch")),
                archive_clips: true,
            };
            PredictionService::new(
                classifier,
                self.store.clone(),
                transcoder,
                capture,
                settings,
                self.media_dir.clone(),
            )
        }
    }

    #[tokio::test]
    async fn upload_is_classified_archived_and_stored() {
        let fixture = Fixture::new();
        let service = fixture.service(
            classifier(15),
            Arc::new(ToneTranscoder),
            Arc::new(crate::audio::UnavailableCapture),
        );

        let prediction = service
            .predict_upload(fixture.user_id, "take.MP3", b"fake mp3 bytes")
            .await
            .unwrap();

        assert_eq!(prediction.genre_name, "blues");
        let expected = 100.0 * 1f64.exp() / (1f64.exp() + 1.0);
        assert!((prediction.confidence - expected).abs() < 1e-9);
        assert_eq!(prediction.features.len(), 15);
        assert!(prediction.audio_file.starts_with("predictions/"));
        assert!(fixture.media_dir.join(&prediction.audio_file).exists());

        let activity = fixture
            .store
            .get_user_activity(fixture.user_id)
            .unwrap()
            .unwrap();
        assert_eq!(activity.total_predictions, 1);
        assert!(fixture.store.get_genre_by_name("blues").unwrap().is_some());
    }

    #[tokio::test]
    async fn unsupported_extension_is_a_validation_error() {
        let fixture = Fixture::new();
        let service = fixture.service(
            classifier(15),
            Arc::new(ToneTranscoder),
            Arc::new(crate::audio::UnavailableCapture),
        );

        let err = service
            .predict_upload(fixture.user_id, "song.flac", b"fLaC")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PredictionError::Validation(ValidationError::UnsupportedFormat)
        ));
        assert!(fixture.store.list_genres().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_and_empty_uploads_are_rejected() {
        let fixture = Fixture::new();
        let service = fixture.service(
            classifier(15),
            Arc::new(ToneTranscoder),
            Arc::new(crate::audio::UnavailableCapture),
        );

        let err = service
            .predict_upload(fixture.user_id, "big.wav", &[0u8; 2048])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::Validation(ValidationError::TooLarge { limit: 1024 })
        ));

        let err = service
            .predict_upload(fixture.user_id, "empty.wav", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::Validation(ValidationError::EmptyUpload)
        ));
    }

    #[tokio::test]
    async fn transcoding_failure_is_a_processing_error() {
        let fixture = Fixture::new();
        let service = fixture.service(
            classifier(15),
            Arc::new(BrokenTranscoder),
            Arc::new(crate::audio::UnavailableCapture),
        );

        let err = service
            .predict_upload(fixture.user_id, "clip.webm", b"webm")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PredictionError::Processing(ProcessingError::Conversion(_))
        ));
        let activity = fixture.store.get_user_activity(fixture.user_id).unwrap();
        assert!(activity.is_none());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_fatal() {
        let fixture = Fixture::new();
        let service = fixture.service(
            classifier(3),
            Arc::new(ToneTranscoder),
            Arc::new(crate::audio::UnavailableCapture),
        );

        let err = service
            .predict_upload(fixture.user_id, "clip.wav", b"RIFF")
            .await
            .unwrap_err();

        assert!(matches!(err, PredictionError::Fatal(_)));
    }

    #[tokio::test]
    async fn recording_is_classified() {
        let fixture = Fixture::new();
        let service = fixture.service(classifier(15), Arc::new(ToneTranscoder), Arc::new(ToneCapture));

        let prediction = service.predict_recording(fixture.user_id).await.unwrap();

        assert_eq!(prediction.genre_name, "blues");
        assert!(fixture.media_dir.join(&prediction.audio_file).exists());
    }

    #[tokio::test]
    async fn missing_microphone_is_a_processing_error() {
        let fixture = Fixture::new();
        let service = fixture.service(
            classifier(15),
            Arc::new(ToneTranscoder),
            Arc::new(crate::audio::UnavailableCapture),
        );

        let err = service.predict_recording(fixture.user_id).await.unwrap_err();

        assert!(matches!(
            err,
            PredictionError::Processing(ProcessingError::Capture(
                CaptureError::DeviceUnavailable(_)
            ))
        ));
    }
}
