use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

pub const DEFAULT_GENRE_COLOR: &str = "#6D6D00";
pub const MAX_GENRE_NAME_LENGTH: usize = 50;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Genre {
    pub id: usize,
    pub name: String,
    pub description: String,
    pub color: String,
    /// Identifier of the genre in an external music catalog, empty if unknown.
    pub external_id: String,
}

/// Fields of a genre that is about to be created.
#[derive(Clone, Debug)]
pub struct GenreDraft {
    pub name: String,
    pub description: String,
    pub color: String,
    pub external_id: String,
}

impl GenreDraft {
    pub fn named<S: Into<String>>(name: S) -> Self {
        GenreDraft {
            name: name.into(),
            description: String::new(),
            color: DEFAULT_GENRE_COLOR.to_string(),
            external_id: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Prediction {
    pub id: usize,
    pub user_id: usize,
    pub audio_file: String,
    pub genre_id: usize,
    pub genre_name: String,
    /// Percentage in [0, 100].
    pub confidence: f64,
    pub features: Vec<f64>,
    pub created: DateTime<Utc>,
    pub feedback: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct NewPrediction {
    pub user_id: usize,
    pub audio_file: String,
    pub genre_id: usize,
    pub confidence: f64,
    pub features: Vec<f64>,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct UserActivity {
    pub user_id: usize,
    pub last_prediction: Option<DateTime<Utc>>,
    pub total_predictions: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct GenreCount {
    pub genre_id: usize,
    pub name: String,
    pub color: String,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TrendingGenre {
    pub id: usize,
    pub genre_id: usize,
    pub genre_name: String,
    pub score: f64,
    pub date: NaiveDate,
    pub created: DateTime<Utc>,
}

/// One row appended by a trend aggregation run.
#[derive(Clone, Debug, PartialEq)]
pub struct TrendSnapshot {
    pub genre_id: usize,
    pub score: f64,
    pub date: NaiveDate,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Review {
    pub id: usize,
    pub user_id: usize,
    pub author: String,
    pub genre_id: Option<usize>,
    pub genre_name: Option<String>,
    pub message: String,
    pub created: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trend_serializes_dates_for_pages() {
        let trend = TrendingGenre {
            id: 1,
            genre_id: 2,
            genre_name: "jazz".to_string(),
            score: 2.0,
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            created: Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&trend).unwrap();
        assert_eq!(json["date"], "2024-03-09");
        assert_eq!(json["created"], "2024-03-09T12:00:00Z");
    }
}
