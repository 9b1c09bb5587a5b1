mod auth_routes;
pub mod config;
mod forms;
mod home_routes;
mod http_layers;
mod job_routes;
pub mod metrics;
mod predict_routes;
pub mod server;
pub(self) mod session;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
