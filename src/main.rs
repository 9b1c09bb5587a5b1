use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use genre_prediction_server::audio::{AudioCapture, AudioTranscoder, FfmpegTranscoder};
use genre_prediction_server::background_jobs::jobs::TrendingGenresJob;
use genre_prediction_server::background_jobs::{create_scheduler, JobContext};
use genre_prediction_server::classifier::GenreClassifier;
use genre_prediction_server::config::{self, AppConfig, FileConfig};
use genre_prediction_server::genre::FullStore;
use genre_prediction_server::prediction::PredictionService;
use genre_prediction_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use genre_prediction_server::store::SqliteStore;
use genre_prediction_server::user::{UserManager, UserStore};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the SQLite database. Can also be specified in the config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// Where classified clips are archived. Defaults to <db-dir>/media.
    #[clap(long, value_parser = parse_path)]
    pub media_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Path to the JSON classifier artifact.
    #[clap(long, value_parser = parse_path)]
    pub classifier_path: Option<PathBuf>,

    /// ffmpeg executable used to transcode uploads.
    #[clap(long)]
    pub ffmpeg_path: Option<String>,

    /// Hours between trend snapshots.
    #[clap(long)]
    pub trends_interval_hours: Option<u64>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            media_dir: args.media_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            classifier_path: args.classifier_path.clone(),
            ffmpeg_path: args.ffmpeg_path.clone(),
            trends_interval_hours: args.trends_interval_hours,
        }
    }
}

#[cfg(feature = "microphone")]
fn make_capture() -> Arc<dyn AudioCapture> {
    info!("Live capture uses the default input device");
    Arc::new(genre_prediction_server::audio::capture::CpalCapture)
}

#[cfg(not(feature = "microphone"))]
fn make_capture() -> Arc<dyn AudioCapture> {
    info!("Built without microphone support, recording requests will fail");
    Arc::new(genre_prediction_server::audio::UnavailableCapture)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&(&cli_args).into(), file_config)?;

    info!("Loading classifier from {:?}...", app_config.classifier_path);
    let classifier = Arc::new(GenreClassifier::load(&app_config.classifier_path)?);
    info!(
        "Classifier ready: {} over {} classes",
        classifier.kind(),
        classifier.classes().len()
    );

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening SQLite database at {:?}...", app_config.db_path());
    let store = Arc::new(SqliteStore::new(app_config.db_path())?);
    metrics::set_users_total(store.count_users()?);
    std::fs::create_dir_all(&app_config.media_dir)
        .with_context(|| format!("Failed to create media dir {:?}", app_config.media_dir))?;

    let transcoder = FfmpegTranscoder::new(app_config.ffmpeg_path.clone());
    if let Err(e) = transcoder.check_available().await {
        warn!("Uploads other than WAV will fail: {}", e);
    }
    let transcoder: Arc<dyn AudioTranscoder> = Arc::new(transcoder);

    let full_store: Arc<dyn FullStore> = store.clone();
    let user_manager = Arc::new(UserManager::new(store.clone()));
    let prediction_service = Arc::new(PredictionService::new(
        classifier,
        full_store.clone(),
        transcoder,
        make_capture(),
        app_config.audio.clone(),
        app_config.media_dir.clone(),
    ));

    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(shutdown_token.child_token(), full_store.clone());
    let (mut scheduler, scheduler_handle) = create_scheduler(shutdown_token.clone(), job_context);
    scheduler
        .register_job(Arc::new(TrendingGenresJob::from_settings(
            &app_config.trends,
        )))
        .await;
    info!(
        "Job scheduler initialized with {} job(s)",
        scheduler.job_count().await
    );

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        frontend_dir_path: app_config.frontend_dir_path.clone(),
        max_upload_bytes: app_config.audio.max_upload_bytes,
    };

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let result = tokio::select! {
        result = run_server(
            server_config,
            app_config.metrics_port,
            user_manager,
            full_store,
            prediction_service,
            Some(scheduler_handle),
            shutdown_token.clone(),
        ) => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            Ok(())
        }
    };

    shutdown_token.cancel();
    if tokio::time::timeout(Duration::from_secs(35), scheduler_task)
        .await
        .is_err()
    {
        error!("Scheduler did not stop in time");
    }
    result
}
