//! Genre Prediction Server Library
//!
//! Exposes the internal modules to the binaries and to the end-to-end tests.

pub mod audio;
pub mod background_jobs;
pub mod classifier;
pub mod config;
pub mod genre;
pub mod prediction;
pub mod server;
pub mod sqlite_persistence;
pub mod store;
pub mod user;

pub use classifier::GenreClassifier;
pub use prediction::PredictionService;
pub use server::{make_app, run_server, RequestsLoggingLevel};
pub use store::SqliteStore;
pub use user::UserManager;
