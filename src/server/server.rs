use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::time::{Duration, Instant};

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::info;

use super::auth_routes::make_auth_routes;
use super::home_routes::make_home_routes;
use super::job_routes::make_job_routes;
use super::metrics::metrics_handler;
use super::predict_routes::make_predict_routes;
use super::session::Session;
use super::{log_requests, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub classifier: String,
    pub classes: Vec<String>,
    pub logged_in: bool,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let classifier = state.prediction_service.classifier();
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        classifier: classifier.kind().to_string(),
        classes: classifier.classes().to_vec(),
        logged_in: session.is_some(),
    };
    Json(stats)
}

impl ServerState {
    fn new(
        config: ServerConfig,
        user_manager: GuardedUserManager,
        store: GuardedStore,
        prediction_service: GuardedPredictionService,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            user_manager,
            store,
            prediction_service,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    user_manager: GuardedUserManager,
    store: GuardedStore,
    prediction_service: GuardedPredictionService,
) -> Result<Router> {
    let state = ServerState::new(config.clone(), user_manager, store, prediction_service);

    let mut app: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .merge(make_auth_routes(state.clone()))
        .merge(make_home_routes(state.clone()))
        .merge(make_predict_routes(state.clone()));

    if let Some(frontend_path) = config.frontend_dir_path {
        let static_files_service =
            ServeDir::new(frontend_path).append_index_html_on_directories(true);
        app = app.fallback_service(static_files_service);
    }

    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

fn make_metrics_app(scheduler: OptionalSchedulerHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(make_job_routes(scheduler))
}

/// Serves the application until `shutdown` fires. The metrics port also
/// carries the job endpoints.
pub async fn run_server(
    config: ServerConfig,
    metrics_port: u16,
    user_manager: GuardedUserManager,
    store: GuardedStore,
    prediction_service: GuardedPredictionService,
    scheduler: OptionalSchedulerHandle,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, user_manager, store, prediction_service)?;

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    let app_shutdown = shutdown.clone();
    let metrics_shutdown = shutdown;
    let app_server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { app_shutdown.cancelled().await })
        .into_future();
    let metrics_server = axum::serve(metrics_listener, make_metrics_app(scheduler))
        .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
        .into_future();

    tokio::try_join!(app_server, metrics_server)?;
    info!("Servers stopped");
    Ok(())
}
