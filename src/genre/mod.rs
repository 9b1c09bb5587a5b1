pub mod models;
mod store;
pub mod trends;

pub use models::{
    Genre, GenreCount, GenreDraft, NewPrediction, Prediction, Review, TrendSnapshot,
    TrendingGenre, UserActivity,
};
pub use store::{
    FullStore, GenreDeletionError, GenreStore, PredictionStore, ReviewStore, TrendStore,
};
pub use trends::{trend_score, update_trends};
