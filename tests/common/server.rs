//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own database and media
//! directory, listening on a random local port.

use super::constants::*;
use super::fixtures::{create_test_users, fixture_classifier, ToneCapture, ToneTranscoder};
use genre_prediction_server::config::AudioSettings;
use genre_prediction_server::genre::FullStore;
use genre_prediction_server::prediction::PredictionService;
use genre_prediction_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use genre_prediction_server::store::SqliteStore;
use genre_prediction_server::user::UserManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Upload limit used by test servers, small enough to exceed cheaply.
pub const TEST_MAX_UPLOAD_BYTES: usize = 64 * 1024;

/// When dropped, the server shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Direct database access for assertions and seeding
    pub store: Arc<SqliteStore>,

    /// Where classified clips are archived
    pub media_dir: PathBuf,

    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a server with two seeded users and the fixture classifier.
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created or the server does not come
    /// up within [`SERVER_READY_TIMEOUT_MS`].
    pub async fn spawn() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let media_dir = temp_dir.path().join("media");

        let store = Arc::new(
            SqliteStore::new(temp_dir.path().join("test.db")).expect("Failed to open store"),
        );
        create_test_users(store.clone()).expect("Failed to seed users");

        let full_store: Arc<dyn FullStore> = store.clone();
        let settings = AudioSettings {
            max_upload_bytes: TEST_MAX_UPLOAD_BYTES,
            capture_duration: Duration::from_secs(1),
            capture_timeout_grace: Duration::from_secs(5),
            scratch_dir: Some(temp_dir.path().join("scratch")),
            archive_clips: true,
        };
        let prediction_service = Arc::new(PredictionService::new(
            Arc::new(fixture_classifier().expect("Failed to build classifier")),
            full_store.clone(),
            Arc::new(ToneTranscoder::default()),
            Arc::new(ToneCapture),
            settings,
            media_dir.clone(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            frontend_dir_path: None,
            max_upload_bytes: TEST_MAX_UPLOAD_BYTES,
        };
        let app = make_app(
            config,
            Arc::new(UserManager::new(store.clone())),
            full_store,
            prediction_service,
        )
        .expect("Failed to build app");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            store,
            media_dir,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    /// Polls the status route until it answers.
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }
            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
