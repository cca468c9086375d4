//! # Job Completion Waiter
//!
//! Polls the job queue for a dispatched job until it reaches a terminal
//! status or the wait budget runs out.
//!
//! Polling uses `tokio::time` for both the clock and the sleep, so a waiter
//! under a paused test clock is fully deterministic. The final sleep is
//! clamped to the deadline, and one last poll happens at the deadline before
//! the job is declared timed out.

use crate::config::ExecutionConfig;
use crate::constants::{self, messages, metadata};
use crate::messaging::{JobId, JobQueue, JobSnapshot, JobStatus};
use crate::orchestration::types::StepExecutionResult;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

#[derive(Clone)]
pub struct JobCompletionWaiter {
    queue: Arc<dyn JobQueue>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl std::fmt::Debug for JobCompletionWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCompletionWaiter")
            .field("provider", &self.queue.provider_name())
            .field("poll_interval", &self.poll_interval)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}

impl JobCompletionWaiter {
    /// Waiter polling every second for at most five minutes
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            poll_interval: Duration::from_millis(constants::DEFAULT_POLL_INTERVAL_MS),
            max_wait: Duration::from_millis(constants::DEFAULT_MAX_WAIT_MS),
        }
    }

    pub fn from_config(queue: Arc<dyn JobQueue>, config: &ExecutionConfig) -> Self {
        Self {
            queue,
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Wait for `job_id` to complete or fail, folding every outcome into a result
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn wait_for_job_completion(&self, job_id: &JobId) -> StepExecutionResult {
        let started = Instant::now();
        let deadline = started + self.max_wait;
        let mut polls: u32 = 0;
        let mut last_attempts: u32 = 0;

        loop {
            polls += 1;

            match self.queue.get_job(job_id).await {
                Err(e) => {
                    warn!(error = %e, polls, "Queue error while polling job");
                    return StepExecutionResult::failure(e.to_string())
                        .with_metadata(metadata::JOB_ID, json!(job_id.as_str()))
                        .with_duration(started.elapsed());
                }
                Ok(None) => {
                    warn!(polls, "Job disappeared from queue while waiting");
                    return StepExecutionResult::failure(messages::JOB_NOT_FOUND)
                        .with_metadata(metadata::JOB_ID, json!(job_id.as_str()))
                        .with_duration(started.elapsed());
                }
                Ok(Some(job)) if job.status.is_terminal() => {
                    debug!(
                        status = %job.status,
                        attempts = job.attempts,
                        polls,
                        "Job reached terminal status"
                    );
                    return terminal_result(job).with_duration(started.elapsed());
                }
                Ok(Some(job)) => {
                    last_attempts = job.attempts;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    polls,
                    max_wait_ms = self.max_wait.as_millis() as u64,
                    "Job did not finish before the wait deadline"
                );
                return StepExecutionResult::failure(messages::JOB_TIMEOUT)
                    .with_metadata(metadata::JOB_ID, json!(job_id.as_str()))
                    .with_metadata(metadata::ATTEMPTS, json!(last_attempts))
                    .with_duration(started.elapsed());
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

fn terminal_result(job: JobSnapshot) -> StepExecutionResult {
    let result = match job.status {
        JobStatus::Completed => {
            StepExecutionResult::success(job.result.unwrap_or(serde_json::Value::Null))
        }
        _ => StepExecutionResult::failure(
            job.failed_reason
                .unwrap_or_else(|| messages::JOB_FAILED.to_string()),
        ),
    };

    result
        .with_metadata(metadata::JOB_ID, json!(job.id.as_str()))
        .with_metadata(metadata::ATTEMPTS, json!(job.attempts))
}
