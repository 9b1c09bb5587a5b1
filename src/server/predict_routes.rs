//! Genre prediction from uploads or the local microphone, plus the user's
//! prediction history and feedback on past predictions.

use super::forms::FeedbackForm;
use super::metrics;
use super::session::Session;
use super::state::{GuardedPredictionService, GuardedStore, ServerState};
use crate::audio::ValidationError;
use crate::genre::Prediction;
use crate::prediction::PredictionError;

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartError, DefaultBodyLimit, FromRequest, Multipart, Path, Request,
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub const HISTORY_LIMIT: usize = 50;
const HISTORY_PATH: &str = "/history/";
/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Serialize, Debug)]
struct PredictionView {
    id: usize,
    genre: String,
    confidence: f64,
    created: DateTime<Utc>,
}

impl From<Prediction> for PredictionView {
    fn from(prediction: Prediction) -> Self {
        PredictionView {
            id: prediction.id,
            genre: prediction.genre_name,
            confidence: prediction.confidence,
            created: prediction.created,
        }
    }
}

#[derive(Serialize, Debug, Default)]
struct PredictPage {
    prediction: Option<PredictionView>,
    error: Option<String>,
    error_kind: Option<&'static str>,
}

/// What the user asked for in a POST to `/predict/`.
enum PredictInput {
    Upload { filename: String, bytes: Bytes },
    Record,
    /// The body went past the request size limit while being read.
    Oversized,
    Nothing,
}

#[derive(Deserialize, Default)]
struct RecordForm {
    record: Option<String>,
}

fn multipart_rejection(err: MultipartError) -> Result<PredictInput, Response> {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Ok(PredictInput::Oversized);
    }
    Err((err.status(), err.body_text()).into_response())
}

async fn read_multipart(mut multipart: Multipart) -> Result<PredictInput, Response> {
    let mut upload = None;
    let mut record = false;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return multipart_rejection(err),
        };
        match field.name() {
            Some("file") => {
                // An untouched file input still sends a part, with no filename.
                let filename = match field.file_name() {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => continue,
                };
                match field.bytes().await {
                    Ok(bytes) => upload = Some((filename, bytes)),
                    Err(err) => return multipart_rejection(err),
                }
            }
            Some("record") => record = true,
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }
    Ok(match upload {
        Some((filename, bytes)) => PredictInput::Upload { filename, bytes },
        None if record => PredictInput::Record,
        None => PredictInput::Nothing,
    })
}

async fn read_predict_input(request: Request) -> Result<PredictInput, Response> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        return read_multipart(multipart).await;
    }
    if !content_type.starts_with("application/x-www-form-urlencoded") {
        return Ok(PredictInput::Nothing);
    }

    let Form(form) = Form::<RecordForm>::from_request(request, &())
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(if form.record.is_some() {
        PredictInput::Record
    } else {
        PredictInput::Nothing
    })
}

async fn get_predict(_session: Session) -> Json<PredictPage> {
    Json(PredictPage::default())
}

async fn post_predict(
    session: Session,
    State(service): State<GuardedPredictionService>,
    request: Request,
) -> Response {
    let input = match read_predict_input(request).await {
        Ok(input) => input,
        Err(response) => return response,
    };

    let result = match input {
        PredictInput::Upload { filename, bytes } => {
            service
                .predict_upload(session.user_id, &filename, &bytes)
                .await
        }
        PredictInput::Record => service.predict_recording(session.user_id).await,
        PredictInput::Oversized => {
            info!("Rejected upload of user {} past the body limit", session.user_id);
            Err(ValidationError::TooLarge {
                limit: service.max_upload_bytes(),
            }
            .into())
        }
        PredictInput::Nothing => return Json(PredictPage::default()).into_response(),
    };

    let page = match result {
        Ok(prediction) => PredictPage {
            prediction: Some(prediction.into()),
            ..Default::default()
        },
        Err(PredictionError::Validation(err)) => PredictPage {
            error: Some(err.to_string()),
            error_kind: Some("validation"),
            ..Default::default()
        },
        Err(PredictionError::Processing(err)) => PredictPage {
            error: Some(err.to_string()),
            error_kind: Some("processing"),
            ..Default::default()
        },
        Err(PredictionError::Fatal(_)) => {
            metrics::record_error("fatal", "/predict/");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    };
    Json(page).into_response()
}

async fn get_history(session: Session, State(store): State<GuardedStore>) -> Response {
    match store.list_user_predictions(session.user_id, HISTORY_LIMIT) {
        Ok(predictions) => Json(serde_json::json!({ "predictions": predictions })).into_response(),
        Err(err) => {
            error!("Failed to list predictions of user {}: {:#}", session.user_id, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn post_feedback(
    session: Session,
    State(store): State<GuardedStore>,
    Path(prediction_id): Path<usize>,
    Form(form): Form<FeedbackForm>,
) -> Response {
    match store.set_prediction_feedback(prediction_id, session.user_id, form.correct) {
        Ok(true) => Redirect::to(HISTORY_PATH).into_response(),
        Ok(false) => {
            warn!(
                "User {} sent feedback for prediction {} they do not own",
                session.user_id, prediction_id
            );
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => {
            error!("Failed to store feedback: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn make_predict_routes(state: ServerState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    Router::new()
        .route(
            "/predict/",
            get(get_predict)
                .post(post_predict)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/history/", get(get_history))
        .route("/predictions/{id}/feedback/", post(post_feedback))
        .with_state(state)
}
