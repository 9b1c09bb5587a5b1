//! From an upload or a live recording to a stored prediction.

mod service;

pub use service::{PredictionError, PredictionService, PredictionSource};
