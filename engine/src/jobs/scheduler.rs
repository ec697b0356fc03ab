// Job Scheduler - drives the periodic sequence tick

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::info;
use uuid::Uuid;

use crate::sequences::SequenceScheduler;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub sequence_tick_interval_minutes: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            // Hourly tick; drip delays are measured in hours and days
            sequence_tick_interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    PartialFailure,
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    sequences: Arc<SequenceScheduler>,
    config: JobConfig,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl JobScheduler {
    pub async fn new(sequences: Arc<SequenceScheduler>, config: JobConfig) -> JobResult<Self> {
        if config.sequence_tick_interval_minutes == 0 {
            return Err(JobError::ConfigError(
                "sequence tick interval must be at least one minute".to_string(),
            ));
        }
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            sequences,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_sequence_tick().await?;
        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await?;
        Ok(())
    }

    pub async fn execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    /// Run the sequence tick immediately, outside its schedule.
    pub async fn run_tick_now(&self) -> JobExecutionLog {
        let log = run_sequence_tick(&self.sequences).await;
        push_log(&self.execution_logs, log.clone()).await;
        log
    }

    async fn schedule_sequence_tick(&self) -> JobResult<()> {
        let interval = self.config.sequence_tick_interval_minutes;
        let cron_expr = if interval >= 60 && interval % 60 == 0 {
            format!("0 0 */{} * * *", interval / 60) // Every N hours
        } else {
            format!("0 */{} * * * *", interval) // Every N minutes
        };

        let sequences = self.sequences.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let sequences = sequences.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let log = run_sequence_tick(&sequences).await;
                push_log(&logs, log).await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!(
            "Scheduled sequence tick to run every {} minutes",
            interval
        );

        Ok(())
    }
}

async fn run_sequence_tick(sequences: &SequenceScheduler) -> JobExecutionLog {
    let started_at = Utc::now();
    info!("Running sequence tick job");

    let report = sequences.tick().await;

    let completed_at = Utc::now();
    let status = if report.errors.is_empty() {
        JobStatus::Completed
    } else if report.sent > 0 || report.completed > 0 {
        JobStatus::PartialFailure
    } else {
        JobStatus::Failed
    };

    info!(
        "Sequence tick completed: {} rows examined, {} sent, {} completed",
        report.rows_examined, report.sent, report.completed
    );

    JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: "Sequence Tick".to_string(),
        started_at,
        completed_at: Some(completed_at),
        status,
        items_processed: report.rows_examined as i32,
        errors: report.errors,
        duration_ms: Some((completed_at - started_at).num_milliseconds()),
    }
}

async fn push_log(logs: &Arc<RwLock<Vec<JobExecutionLog>>>, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    // Keep only last 100 logs
    if logs.len() > 100 {
        logs.remove(0);
    }
}
