//! Background job scheduling and execution.
//!
//! Jobs run either on a fixed interval or in response to hook events such as
//! server startup. The scheduler owns the loop; a [`SchedulerHandle`] lets
//! other parts of the process inspect jobs and trigger them manually.

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, JobRunInfo, SchedulerHandle};
pub use job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::{create_scheduler, JobScheduler};
