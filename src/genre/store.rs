use super::models::{
    Genre, GenreCount, GenreDraft, NewPrediction, Prediction, Review, TrendSnapshot,
    TrendingGenre, UserActivity,
};
use crate::user::UserStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenreDeletionError {
    #[error("Genre {0} not found")]
    NotFound(usize),
    #[error("Genre {name} is referenced by {predictions} prediction(s) and cannot be deleted")]
    Protected { name: String, predictions: usize },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub trait GenreStore: Send + Sync {
    /// Fails if a genre with the same name exists.
    fn create_genre(&self, draft: &GenreDraft) -> Result<Genre>;

    /// Returns the genre with the given name, creating it with default
    /// attributes if missing.
    fn get_or_create_genre(&self, name: &str) -> Result<Genre>;

    fn get_genre(&self, genre_id: usize) -> Result<Option<Genre>>;

    fn get_genre_by_name(&self, name: &str) -> Result<Option<Genre>>;

    /// All genres ordered by name.
    fn list_genres(&self) -> Result<Vec<Genre>>;

    /// Deletes a genre. Fails with [`GenreDeletionError::Protected`] while any
    /// prediction references it; reviews referencing it lose their genre.
    fn delete_genre(&self, genre_id: usize) -> Result<(), GenreDeletionError>;

    /// Genres with at least one prediction, by all-time prediction count
    /// descending.
    fn top_genres(&self, limit: usize) -> Result<Vec<GenreCount>>;

    /// The genre with the most predictions created after `since`.
    fn most_predicted_since(&self, since: DateTime<Utc>) -> Result<Option<GenreCount>>;
}

pub trait PredictionStore: Send + Sync {
    /// Inserts the prediction and updates the owner's activity record in the
    /// same transaction.
    fn record_prediction(&self, prediction: &NewPrediction) -> Result<Prediction>;

    fn get_prediction(&self, prediction_id: usize) -> Result<Option<Prediction>>;

    /// Most recent first.
    fn list_user_predictions(&self, user_id: usize, limit: usize) -> Result<Vec<Prediction>>;

    /// Stores the user's verdict on a prediction they own.
    /// Returns false if no such prediction belongs to `user_id`.
    fn set_prediction_feedback(
        &self,
        prediction_id: usize,
        user_id: usize,
        correct: bool,
    ) -> Result<bool>;

    fn get_user_activity(&self, user_id: usize) -> Result<Option<UserActivity>>;

    /// Per-genre number of predictions created in `(from, to]`.
    /// Genres without predictions in the window are absent.
    fn count_predictions_by_genre(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<usize, usize>>;
}

pub trait ReviewStore: Send + Sync {
    fn add_review(&self, user_id: usize, genre_id: Option<usize>, message: &str)
        -> Result<Review>;

    /// Most recent first.
    fn latest_reviews(&self, limit: usize) -> Result<Vec<Review>>;
}

pub trait TrendStore: Send + Sync {
    /// Appends the snapshots; existing rows are never touched.
    fn append_trend_snapshots(&self, snapshots: &[TrendSnapshot]) -> Result<Vec<TrendingGenre>>;

    /// Rows of the most recent aggregation run, highest score first.
    fn latest_trends(&self) -> Result<Vec<TrendingGenre>>;

    /// All snapshots, most recent date first then highest score first.
    fn trend_history(&self, limit: usize) -> Result<Vec<TrendingGenre>>;
}

pub trait FullStore: UserStore + GenreStore + PredictionStore + ReviewStore + TrendStore {}

impl<T> FullStore for T where T: UserStore + GenreStore + PredictionStore + ReviewStore + TrendStore {}
