use super::context::JobContext;
use super::handle::{JobRun, JobRunStatus, SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, HookEvent, JobError, ShutdownBehavior};
use crate::server::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Upper bound on how long the loop sleeps without re-checking schedules.
const MAX_SLEEP: Duration = Duration::from_secs(60);
const SHUTDOWN_WAIT: Duration = Duration::from_secs(30);

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Task handles of running jobs, owned by the scheduler loop.
    running_handles: HashMap<String, JoinHandle<()>>,

    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            command_receiver,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job. Interval jobs get their first run one interval from now.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());
        let mut state = self.shared_state.write().await;
        if let Some(interval) = job.schedule().interval() {
            state
                .next_runs
                .insert(job_id.clone(), next_run_after(Utc::now(), interval));
        }
        state.jobs.insert(job_id, job);
    }

    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop. Returns after the shutdown token fires.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        self.trigger_jobs_for_hook(HookEvent::OnStartup).await;

        loop {
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let state = self.shared_state.read().await;
        if !state.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }
        if state.running_jobs.contains(job_id) {
            return Err(JobError::AlreadyRunning);
        }
        drop(state);

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    async fn time_until_next_scheduled_job(&self) -> Duration {
        let now = Utc::now();
        let state = self.shared_state.read().await;
        state
            .next_runs
            .iter()
            .filter(|(job_id, _)| !state.running_jobs.contains(*job_id))
            .map(|(_, next_run)| (*next_run - now).to_std().unwrap_or(Duration::ZERO))
            .fold(MAX_SLEEP, Duration::min)
    }

    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let due: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .next_runs
                .iter()
                .filter(|(job_id, next_run)| {
                    **next_run <= now && !state.running_jobs.contains(*job_id)
                })
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in due {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    async fn trigger_jobs_for_hook(&mut self, event: HookEvent) {
        let jobs_to_trigger: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .jobs
                .iter()
                .filter(|(job_id, job)| {
                    if state.running_jobs.contains(*job_id) {
                        debug!("Skipping hook trigger for already running job: {}", job_id);
                        return false;
                    }
                    job.schedule().listens_to(event)
                })
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in jobs_to_trigger {
            let trigger = format!("hook:{}", event);
            self.spawn_job(&job_id, &trigger).await;
        }
    }

    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let job = {
            let mut state = self.shared_state.write().await;
            let job = match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            };
            state.running_jobs.insert(job_id.to_string());
            state
                .last_runs
                .insert(job_id.to_string(), JobRun::started(triggered_by));
            // Pushed forward now so a slow run cannot be picked up twice.
            if let Some(interval) = job.schedule().interval() {
                state
                    .next_runs
                    .insert(job_id.to_string(), next_run_after(Utc::now(), interval));
            }
            job
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);
        metrics::set_background_job_running(job_id, true);

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());
        let ctx = self.job_context.with_token(cancel_token);

        let job_id_owned = job_id.to_string();
        let shared_state = Arc::clone(&self.shared_state);

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            let elapsed = start_time.elapsed();

            let (status, error_msg, status_label) = match result {
                Ok(Ok(())) => {
                    info!(
                        "Job {} completed successfully in {:?}",
                        job_id_owned, elapsed
                    );
                    (JobRunStatus::Completed, None, "success")
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    (
                        JobRunStatus::Failed,
                        Some("Cancelled".to_string()),
                        "cancelled",
                    )
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(e.to_string()), "failed")
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    (
                        JobRunStatus::Failed,
                        Some(format!("Task panic: {}", e)),
                        "panic",
                    )
                }
            };

            metrics::record_background_job_execution(&job_id_owned, status_label, elapsed);
            metrics::set_background_job_running(&job_id_owned, false);

            let mut state = shared_state.write().await;
            if let Some(run) = state.last_runs.get_mut(&job_id_owned) {
                run.finish(status, error_msg);
            }
            state.running_jobs.remove(&job_id_owned);
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(&job_id);
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        {
            let state = self.shared_state.read().await;
            for job_id in &state.running_jobs {
                let cancellable = state
                    .jobs
                    .get(job_id)
                    .map(|job| job.shutdown_behavior() == ShutdownBehavior::Cancellable)
                    .unwrap_or(true);
                if cancellable {
                    if let Some(token) = self.job_cancel_tokens.get(job_id) {
                        debug!("Cancelling job: {}", job_id);
                        token.cancel();
                    }
                }
            }
        }

        for (job_id, handle) in self.running_handles.drain() {
            debug!("Waiting for job {} to stop...", job_id);
            let _ = tokio::time::timeout(SHUTDOWN_WAIT, handle).await;
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

fn next_run_after(from: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|interval| from.checked_add_signed(interval))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let scheduler = JobScheduler::new(
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
    );
    let handle = SchedulerHandle::new(command_tx, shared_state);

    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::job::JobSchedule;
    use crate::store::SqliteStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct TestJob {
        id: &'static str,
        schedule: JobSchedule,
        execution_count: Arc<AtomicUsize>,
        should_fail: Arc<AtomicBool>,
    }

    impl TestJob {
        fn hooked(id: &'static str, execution_count: Arc<AtomicUsize>) -> Self {
            TestJob {
                id,
                schedule: JobSchedule::Hook(HookEvent::OnStartup),
                execution_count,
                should_fail: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl BackgroundJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A test job for unit tests"
        }

        fn schedule(&self) -> JobSchedule {
            self.schedule.clone()
        }

        fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            self.execution_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail.load(Ordering::SeqCst) {
                Err(JobError::ExecutionFailed("Test failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Blocks until cancelled.
    struct StubbornJob;

    impl BackgroundJob for StubbornJob {
        fn id(&self) -> &'static str {
            "stubborn"
        }

        fn name(&self) -> &'static str {
            "Stubborn"
        }

        fn description(&self) -> &'static str {
            "Runs until cancelled"
        }

        fn schedule(&self) -> JobSchedule {
            JobSchedule::Hook(HookEvent::OnStartup)
        }

        fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
            while !ctx.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(JobError::Cancelled)
        }
    }

    fn create_test_scheduler() -> (JobScheduler, SchedulerHandle, TempDir, CancellationToken) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(temp_dir.path().join("test.db")).unwrap());
        let shutdown_token = CancellationToken::new();
        let job_context = JobContext::new(shutdown_token.child_token(), store);
        let (scheduler, handle) = create_scheduler(shutdown_token.clone(), job_context);
        (scheduler, handle, temp_dir, shutdown_token)
    }

    async fn wait_until_idle(handle: &SchedulerHandle, job_id: &str) {
        for _ in 0..200 {
            if let Some(job) = handle.get_job(job_id).await {
                if job.last_run.is_some() && !job.is_running {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn registered_jobs_are_listed() {
        let (mut scheduler, handle, _temp_dir, _shutdown) = create_test_scheduler();
        assert!(handle.list_jobs().await.is_empty());
        assert!(!handle.job_exists("test_job").await);

        scheduler
            .register_job(Arc::new(TestJob::hooked(
                "test_job",
                Arc::new(AtomicUsize::new(0)),
            )))
            .await;

        let jobs = handle.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "test_job");
        assert_eq!(jobs[0].name, "Test Job");
        assert!(!jobs[0].is_running);
        assert!(jobs[0].last_run.is_none());
        assert!(jobs[0].next_run_at.is_none());
        assert!(handle.job_exists("test_job").await);
        assert!(!handle.is_job_running("test_job").await);
    }

    #[tokio::test]
    async fn interval_jobs_get_a_next_run() {
        let (mut scheduler, handle, _temp_dir, _shutdown) = create_test_scheduler();
        scheduler
            .register_job(Arc::new(TestJob {
                id: "hourly",
                schedule: JobSchedule::Interval(Duration::from_secs(3600)),
                execution_count: Arc::new(AtomicUsize::new(0)),
                should_fail: Arc::new(AtomicBool::new(false)),
            }))
            .await;

        let job = handle.get_job("hourly").await.unwrap();
        assert!(job.next_run_at.is_some());
        assert_eq!(scheduler.time_until_next_scheduled_job().await, MAX_SLEEP);
    }

    #[tokio::test]
    async fn startup_hook_runs_job_and_records_outcome() {
        let (mut scheduler, handle, _temp_dir, shutdown) = create_test_scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_job(Arc::new(TestJob::hooked("test_job", count.clone())))
            .await;

        let loop_task = tokio::spawn(async move { scheduler.run().await });
        wait_until_idle(&handle, "test_job").await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let last_run = handle.get_job("test_job").await.unwrap().last_run.unwrap();
        assert_eq!(last_run.status, "completed");
        assert_eq!(last_run.triggered_by, "hook:OnStartup");

        shutdown.cancel();
        loop_task.await.unwrap();
    }

    #[tokio::test]
    async fn manual_trigger_and_failures() {
        let (mut scheduler, handle, _temp_dir, shutdown) = create_test_scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        let should_fail = Arc::new(AtomicBool::new(true));
        scheduler
            .register_job(Arc::new(TestJob {
                id: "manual_job",
                schedule: JobSchedule::Interval(Duration::from_secs(3600)),
                execution_count: count.clone(),
                should_fail: should_fail.clone(),
            }))
            .await;
        let loop_task = tokio::spawn(async move { scheduler.run().await });

        assert!(matches!(
            handle.trigger_job("missing").await,
            Err(JobError::NotFound)
        ));

        handle.trigger_job("manual_job").await.unwrap();
        wait_until_idle(&handle, "manual_job").await;
        let last_run = handle.get_job("manual_job").await.unwrap().last_run.unwrap();
        assert_eq!(last_run.status, "failed");
        assert_eq!(
            last_run.error_message.as_deref(),
            Some("Execution failed: Test failure")
        );
        assert_eq!(last_run.triggered_by, "manual");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        loop_task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_cancels_running_jobs() {
        let (mut scheduler, handle, _temp_dir, shutdown) = create_test_scheduler();
        scheduler.register_job(Arc::new(StubbornJob)).await;
        let loop_task = tokio::spawn(async move { scheduler.run().await });

        for _ in 0..200 {
            if handle.is_job_running("stubborn").await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(
            handle.trigger_job("stubborn").await,
            Err(JobError::AlreadyRunning)
        ));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), loop_task)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        let last_run = handle.get_job("stubborn").await.unwrap().last_run.unwrap();
        assert_eq!(last_run.status, "failed");
        assert_eq!(last_run.error_message.as_deref(), Some("Cancelled"));
    }
}
