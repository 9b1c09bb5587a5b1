//! Growth-weighted genre popularity.
//!
//! Each run compares the number of predictions per genre in the last week
//! with the week before it and appends one snapshot per genre. Runs are
//! independent of each other; history only accumulates.

use super::models::{TrendSnapshot, TrendingGenre};
use super::store::{GenreStore, PredictionStore, TrendStore};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

pub const TREND_WINDOW_DAYS: i64 = 7;

/// `current * (1 + growth)` where growth is relative to `max(1, previous)`.
pub fn trend_score(current: usize, previous: usize) -> f64 {
    let current = current as f64;
    let growth = (current - previous as f64) / previous.max(1) as f64;
    current * (1.0 + growth)
}

/// The two adjacent windows, both half-open on the left: `(start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendWindows {
    pub current: (DateTime<Utc>, DateTime<Utc>),
    pub previous: (DateTime<Utc>, DateTime<Utc>),
}

impl TrendWindows {
    pub fn ending_at(now: DateTime<Utc>) -> Self {
        let window = Duration::days(TREND_WINDOW_DAYS);
        let boundary = now - window;
        TrendWindows {
            current: (boundary, now),
            previous: (boundary - window, boundary),
        }
    }
}

pub fn update_trends<S>(store: &S, now: DateTime<Utc>) -> Result<Vec<TrendingGenre>>
where
    S: GenreStore + PredictionStore + TrendStore + ?Sized,
{
    let windows = TrendWindows::ending_at(now);
    let current = store.count_predictions_by_genre(windows.current.0, windows.current.1)?;
    let previous = store.count_predictions_by_genre(windows.previous.0, windows.previous.1)?;

    let snapshots: Vec<TrendSnapshot> = store
        .list_genres()?
        .into_iter()
        .map(|genre| {
            let cur = current.get(&genre.id).copied().unwrap_or(0);
            let prev = previous.get(&genre.id).copied().unwrap_or(0);
            let score = trend_score(cur, prev);
            debug!("{}: current={} previous={} score={}", genre.name, cur, prev, score);
            TrendSnapshot {
                genre_id: genre.id,
                score,
                date: now.date_naive(),
                created: now,
            }
        })
        .collect();

    let appended = store.append_trend_snapshots(&snapshots)?;
    info!("Appended {} trend snapshot(s)", appended.len());
    Ok(appended)
}
