//! Operator endpoints for background jobs, served next to `/metrics`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};

use super::state::OptionalSchedulerHandle;
use crate::background_jobs::JobError;

fn scheduler_unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "Job scheduler is not running").into_response()
}

async fn list_jobs(State(scheduler): State<OptionalSchedulerHandle>) -> Response {
    match scheduler {
        Some(scheduler) => Json(scheduler.list_jobs().await).into_response(),
        None => scheduler_unavailable(),
    }
}

async fn get_job(
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
) -> Response {
    let Some(scheduler) = scheduler else {
        return scheduler_unavailable();
    };
    match scheduler.get_job(&job_id).await {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn trigger_job(
    State(scheduler): State<OptionalSchedulerHandle>,
    Path(job_id): Path<String>,
) -> Response {
    let Some(scheduler) = scheduler else {
        return scheduler_unavailable();
    };
    match scheduler.trigger_job(&job_id).await {
        Ok(()) => {
            info!("Job {} triggered manually", job_id);
            StatusCode::ACCEPTED.into_response()
        }
        Err(JobError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err @ JobError::AlreadyRunning) => {
            (StatusCode::CONFLICT, err.to_string()).into_response()
        }
        Err(err) => {
            warn!("Could not trigger job {}: {}", job_id, err);
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response()
        }
    }
}

pub fn make_job_routes(scheduler: OptionalSchedulerHandle) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/trigger", post(trigger_job))
        .with_state(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::jobs::TrendingGenresJob;
    use crate::background_jobs::{create_scheduler, JobContext};
    use crate::config::TrendsSettings;
    use crate::genre::TrendStore;
    use crate::store::SqliteStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn without_scheduler_jobs_are_unavailable() {
        let app = make_job_routes(None);
        let response = app
            .oneshot(Request::get("/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn trends_can_be_refreshed_on_demand() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(dir.path().join("test.db")).unwrap());
        let shutdown = CancellationToken::new();
        let context = JobContext::new(shutdown.child_token(), store.clone());
        let (mut scheduler, handle) = create_scheduler(shutdown.clone(), context);
        scheduler
            .register_job(Arc::new(TrendingGenresJob::from_settings(
                &TrendsSettings::default(),
            )))
            .await;
        let scheduler_task = tokio::spawn(async move { scheduler.run().await });
        let app = make_job_routes(Some(handle));

        let response = app
            .clone()
            .oneshot(Request::get("/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let jobs = body_json(response).await;
        assert_eq!(jobs[0]["id"], "trending_genres");

        let response = app
            .clone()
            .oneshot(
                Request::post("/jobs/missing/trigger")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // The startup hook may still be running the job.
        let mut accepted = false;
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(
                    Request::post("/jobs/trending_genres/trigger")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            if response.status() == StatusCode::ACCEPTED {
                accepted = true;
                break;
            }
            assert_eq!(response.status(), StatusCode::CONFLICT);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(accepted);

        let mut last_run = serde_json::Value::Null;
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(
                    Request::get("/jobs/trending_genres")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let job = body_json(response).await;
            if job["last_run"]["triggered_by"] == "manual" && job["is_running"] == false {
                last_run = job["last_run"].clone();
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(last_run["status"], "completed");
        assert!(store.latest_trends().is_ok());

        shutdown.cancel();
        scheduler_task.await.unwrap();
    }
}
