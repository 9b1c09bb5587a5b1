use super::{conversion_error, datetime_from_column, now_seconds, SqliteStore};
use crate::genre::models::MAX_GENRE_NAME_LENGTH;
use crate::genre::{
    Genre, GenreCount, GenreDeletionError, GenreDraft, GenreStore, NewPrediction, Prediction,
    PredictionStore, Review, ReviewStore, TrendSnapshot, TrendStore, TrendingGenre,
    UserActivity,
};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

const GENRE_COLUMNS: &str = "id, name, description, color, external_id";

const PREDICTION_SELECT: &str = "SELECT p.id, p.user_id, p.audio_file, p.genre_id, g.name, \
     p.confidence, p.features, p.created, p.feedback \
     FROM prediction p JOIN genre g ON g.id = p.genre_id";

const TREND_SELECT: &str = "SELECT t.id, t.genre_id, g.name, t.score, t.date, t.created \
     FROM trending_genre t JOIN genre g ON g.id = t.genre_id";

const REVIEW_SELECT: &str = "SELECT r.id, r.user_id, u.handle, r.genre_id, g.name, r.message, \
     r.created FROM review r JOIN user u ON u.id = r.user_id \
     LEFT JOIN genre g ON g.id = r.genre_id";

fn genre_from_row(row: &Row) -> rusqlite::Result<Genre> {
    Ok(Genre {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        color: row.get(3)?,
        external_id: row.get(4)?,
    })
}

fn genre_count_from_row(row: &Row) -> rusqlite::Result<GenreCount> {
    Ok(GenreCount {
        genre_id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        count: row.get(3)?,
    })
}

fn prediction_from_row(row: &Row) -> rusqlite::Result<Prediction> {
    let features: Vec<f64> =
        serde_json::from_str(&row.get::<_, String>(6)?).map_err(|e| conversion_error(6, e))?;
    Ok(Prediction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        audio_file: row.get(2)?,
        genre_id: row.get(3)?,
        genre_name: row.get(4)?,
        confidence: row.get(5)?,
        features,
        created: datetime_from_column(row.get(7)?),
        feedback: row.get(8)?,
    })
}

fn trend_from_row(row: &Row) -> rusqlite::Result<TrendingGenre> {
    let date = NaiveDate::parse_from_str(&row.get::<_, String>(4)?, "%Y-%m-%d")
        .map_err(|e| conversion_error(4, e))?;
    Ok(TrendingGenre {
        id: row.get(0)?,
        genre_id: row.get(1)?,
        genre_name: row.get(2)?,
        score: row.get(3)?,
        date,
        created: datetime_from_column(row.get(5)?),
    })
}

fn review_from_row(row: &Row) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author: row.get(2)?,
        genre_id: row.get(3)?,
        genre_name: row.get(4)?,
        message: row.get(5)?,
        created: datetime_from_column(row.get(6)?),
    })
}

fn check_genre_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Genre name cannot be empty");
    }
    if name.chars().count() > MAX_GENRE_NAME_LENGTH {
        bail!(
            "Genre name {} is longer than {} characters",
            name,
            MAX_GENRE_NAME_LENGTH
        );
    }
    Ok(())
}

fn query_genre_by_name(conn: &Connection, name: &str) -> Result<Option<Genre>> {
    Ok(conn
        .query_row(
            &format!("SELECT {GENRE_COLUMNS} FROM genre WHERE name = ?1"),
            params![name],
            genre_from_row,
        )
        .optional()?)
}

fn query_prediction(conn: &Connection, prediction_id: usize) -> Result<Option<Prediction>> {
    Ok(conn
        .query_row(
            &format!("{PREDICTION_SELECT} WHERE p.id = ?1"),
            params![prediction_id],
            prediction_from_row,
        )
        .optional()?)
}

impl GenreStore for SqliteStore {
    fn create_genre(&self, draft: &GenreDraft) -> Result<Genre> {
        check_genre_name(&draft.name)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO genre (name, description, color, external_id) VALUES (?1, ?2, ?3, ?4)",
            params![draft.name, draft.description, draft.color, draft.external_id],
        )
        .with_context(|| format!("Failed to create genre {}", draft.name))?;
        query_genre_by_name(&conn, &draft.name)?
            .with_context(|| format!("Genre {} vanished after insertion", draft.name))
    }

    fn get_or_create_genre(&self, name: &str) -> Result<Genre> {
        check_genre_name(name)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO genre (name) VALUES (?1)",
            params![name],
        )?;
        query_genre_by_name(&conn, name)?
            .with_context(|| format!("Genre {} vanished after insertion", name))
    }

    fn get_genre(&self, genre_id: usize) -> Result<Option<Genre>> {
        Ok(self
            .conn()?
            .query_row(
                &format!("SELECT {GENRE_COLUMNS} FROM genre WHERE id = ?1"),
                params![genre_id],
                genre_from_row,
            )
            .optional()?)
    }

    fn get_genre_by_name(&self, name: &str) -> Result<Option<Genre>> {
        query_genre_by_name(&*self.conn()?, name)
    }

    fn list_genres(&self) -> Result<Vec<Genre>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {GENRE_COLUMNS} FROM genre ORDER BY name"))?;
        let genres = stmt
            .query_map([], genre_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(genres)
    }

    fn delete_genre(&self, genre_id: usize) -> Result<(), GenreDeletionError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(anyhow::Error::from)?;
        let name: Option<String> = tx
            .query_row(
                "SELECT name FROM genre WHERE id = ?1",
                params![genre_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(anyhow::Error::from)?;
        let Some(name) = name else {
            return Err(GenreDeletionError::NotFound(genre_id));
        };
        let predictions: usize = tx
            .query_row(
                "SELECT COUNT(*) FROM prediction WHERE genre_id = ?1",
                params![genre_id],
                |row| row.get(0),
            )
            .map_err(anyhow::Error::from)?;
        if predictions > 0 {
            return Err(GenreDeletionError::Protected { name, predictions });
        }
        tx.execute("DELETE FROM genre WHERE id = ?1", params![genre_id])
            .map_err(anyhow::Error::from)?;
        tx.commit().map_err(anyhow::Error::from)?;
        Ok(())
    }

    fn top_genres(&self, limit: usize) -> Result<Vec<GenreCount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT g.id, g.name, g.color, COUNT(p.id) AS predictions
             FROM genre g JOIN prediction p ON p.genre_id = g.id
             GROUP BY g.id ORDER BY predictions DESC, g.name ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], genre_count_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn most_predicted_since(&self, since: DateTime<Utc>) -> Result<Option<GenreCount>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT g.id, g.name, g.color, COUNT(p.id) AS predictions
                 FROM genre g JOIN prediction p ON p.genre_id = g.id
                 WHERE p.created > ?1
                 GROUP BY g.id ORDER BY predictions DESC, g.name ASC LIMIT 1",
                params![since.timestamp()],
                genre_count_from_row,
            )
            .optional()?)
    }
}

impl PredictionStore for SqliteStore {
    fn record_prediction(&self, prediction: &NewPrediction) -> Result<Prediction> {
        let features = serde_json::to_string(&prediction.features)?;
        let created = prediction.created.timestamp();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO prediction (user_id, audio_file, genre_id, confidence, features, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                prediction.user_id,
                prediction.audio_file,
                prediction.genre_id,
                prediction.confidence,
                features,
                created
            ],
        )
        .context("Failed to insert prediction")?;
        let prediction_id = tx.last_insert_rowid() as usize;
        tx.execute(
            "INSERT INTO user_activity (user_id, last_prediction, total_predictions)
             VALUES (?1, ?2, 1)
             ON CONFLICT(user_id) DO UPDATE SET
                last_prediction = MAX(COALESCE(last_prediction, 0), excluded.last_prediction),
                total_predictions = total_predictions + 1",
            params![prediction.user_id, created],
        )
        .context("Failed to update user activity")?;
        let stored = query_prediction(&tx, prediction_id)?
            .context("Prediction vanished after insertion")?;
        tx.commit()?;
        Ok(stored)
    }

    fn get_prediction(&self, prediction_id: usize) -> Result<Option<Prediction>> {
        query_prediction(&*self.conn()?, prediction_id)
    }

    fn list_user_predictions(&self, user_id: usize, limit: usize) -> Result<Vec<Prediction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{PREDICTION_SELECT} WHERE p.user_id = ?1 ORDER BY p.created DESC, p.id DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![user_id, limit], prediction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_prediction_feedback(
        &self,
        prediction_id: usize,
        user_id: usize,
        correct: bool,
    ) -> Result<bool> {
        let updated = self.conn()?.execute(
            "UPDATE prediction SET feedback = ?1 WHERE id = ?2 AND user_id = ?3",
            params![correct, prediction_id, user_id],
        )?;
        Ok(updated > 0)
    }

    fn get_user_activity(&self, user_id: usize) -> Result<Option<UserActivity>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT user_id, last_prediction, total_predictions
                 FROM user_activity WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserActivity {
                        user_id: row.get(0)?,
                        last_prediction: row.get::<_, Option<i64>>(1)?.map(datetime_from_column),
                        total_predictions: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn count_predictions_by_genre(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<usize, usize>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT genre_id, COUNT(*) FROM prediction
             WHERE created > ?1 AND created <= ?2 GROUP BY genre_id",
        )?;
        let counts = stmt
            .query_map(params![from.timestamp(), to.timestamp()], |row| {
                Ok((row.get::<_, usize>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(counts)
    }
}

impl ReviewStore for SqliteStore {
    fn add_review(
        &self,
        user_id: usize,
        genre_id: Option<usize>,
        message: &str,
    ) -> Result<Review> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO review (user_id, genre_id, message, created) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, genre_id, message, now_seconds()],
        )
        .context("Failed to insert review")?;
        let review_id = conn.last_insert_rowid();
        Ok(conn.query_row(
            &format!("{REVIEW_SELECT} WHERE r.id = ?1"),
            params![review_id],
            review_from_row,
        )?)
    }

    fn latest_reviews(&self, limit: usize) -> Result<Vec<Review>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{REVIEW_SELECT} ORDER BY r.created DESC, r.id DESC LIMIT ?1"
        ))?;
        let reviews = stmt
            .query_map(params![limit], review_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reviews)
    }
}

impl TrendStore for SqliteStore {
    fn append_trend_snapshots(&self, snapshots: &[TrendSnapshot]) -> Result<Vec<TrendingGenre>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let run: i64 = tx.query_row(
            "SELECT COALESCE(MAX(run), 0) + 1 FROM trending_genre",
            [],
            |row| row.get(0),
        )?;
        for snapshot in snapshots {
            tx.execute(
                "INSERT INTO trending_genre (genre_id, score, date, run, created)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot.genre_id,
                    snapshot.score,
                    snapshot.date.format("%Y-%m-%d").to_string(),
                    run,
                    snapshot.created.timestamp()
                ],
            )
            .with_context(|| format!("Failed to append trend of genre {}", snapshot.genre_id))?;
        }
        let appended = {
            let mut stmt = tx.prepare(&format!(
                "{TREND_SELECT} WHERE t.run = ?1 ORDER BY t.score DESC, g.name ASC"
            ))?;
            let rows = stmt
                .query_map(params![run], trend_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        tx.commit()?;
        Ok(appended)
    }

    fn latest_trends(&self) -> Result<Vec<TrendingGenre>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{TREND_SELECT} WHERE t.run = (SELECT MAX(run) FROM trending_genre)
             ORDER BY t.score DESC, g.name ASC"
        ))?;
        let rows = stmt
            .query_map([], trend_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn trend_history(&self, limit: usize) -> Result<Vec<TrendingGenre>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{TREND_SELECT} ORDER BY t.date DESC, t.score DESC, t.id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], trend_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
