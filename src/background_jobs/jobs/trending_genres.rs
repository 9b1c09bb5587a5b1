//! Periodic trend snapshot job.
//!
//! Appends one growth-weighted score per genre by comparing the last seven
//! days of predictions with the seven days before.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior},
};
use crate::config::TrendsSettings;
use crate::genre::update_trends;
use chrono::Utc;
use std::time::Duration;
use tracing::info;

pub struct TrendingGenresJob {
    interval: Duration,
    run_on_startup: bool,
}

impl TrendingGenresJob {
    pub fn from_settings(settings: &TrendsSettings) -> Self {
        Self {
            interval: settings.interval,
            run_on_startup: settings.run_on_startup,
        }
    }
}

impl Default for TrendingGenresJob {
    fn default() -> Self {
        Self::from_settings(&TrendsSettings::default())
    }
}

impl BackgroundJob for TrendingGenresJob {
    fn id(&self) -> &'static str {
        "trending_genres"
    }

    fn name(&self) -> &'static str {
        "Trending Genres"
    }

    fn description(&self) -> &'static str {
        "Append weekly growth-weighted popularity snapshots for every genre"
    }

    fn schedule(&self) -> JobSchedule {
        if self.run_on_startup {
            JobSchedule::Combined {
                interval: Some(self.interval),
                hooks: vec![HookEvent::OnStartup],
            }
        } else {
            JobSchedule::Interval(self.interval)
        }
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::WaitForCompletion
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let snapshots = update_trends(ctx.store.as_ref(), Utc::now())
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;
        info!("Recorded trend scores for {} genre(s)", snapshots.len());
        Ok(())
    }
}
