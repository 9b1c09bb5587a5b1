//! SQLite-backed implementation of every storage trait.
//!
//! Users, genres, predictions, trends and reviews share one database file so
//! that the cascade, restrict and set-null policies between them are enforced
//! by SQLite itself.

mod genre_queries;
mod schema;
mod user_queries;

use crate::sqlite_persistence::open_versioned_db;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, SystemTime},
};

pub const DB_FILE_NAME: &str = "genreprediction.db";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, schema::VERSIONED_SCHEMAS)?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }
}

fn system_time_from_column(value: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(value.max(0) as u64)
}

fn datetime_from_column(value: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(value, 0).unwrap_or_default()
}

fn now_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Wraps a decoding failure of column `index` so it can be returned from a
/// row mapping closure.
fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
}
