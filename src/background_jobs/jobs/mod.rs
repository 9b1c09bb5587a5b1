//! Concrete `BackgroundJob` implementations.

pub mod trending_genres;

pub use trending_genres::TrendingGenresJob;
