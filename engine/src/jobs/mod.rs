// Background Jobs Service
//
// Scheduled background jobs, driven by tokio-cron-scheduler.

pub mod scheduler;

pub use scheduler::{JobConfig, JobError, JobExecutionLog, JobResult, JobScheduler, JobStatus};
