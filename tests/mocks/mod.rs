//! Mock job queue for exercising queue-backed handlers without workers
//!
//! Jobs settle the moment they are added, according to the behavior
//! configured for their queue. Every enqueue is recorded so tests can inspect
//! payloads and options.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tasker_pipeline::messaging::{
    JobId, JobOptions, JobQueue, JobSnapshot, JobStatus, NewJob, QueueError, QueueStats,
};

/// What happens to jobs added to a queue
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Complete with the job's payload `stepId` echoed back
    EchoStepId,
    /// Complete with a fixed value
    Complete(serde_json::Value),
    /// Fail with a reason after exhausting attempts
    Fail(String),
    /// Stay active forever
    Stuck,
    /// Refuse the enqueue
    Reject,
}

#[derive(Debug, Clone)]
pub struct RecordedJob {
    pub queue_name: String,
    pub job: NewJob,
    pub options: JobOptions,
}

#[derive(Debug, Default)]
pub struct MockJobQueue {
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    default_behavior: Mutex<Option<MockBehavior>>,
    jobs: Mutex<HashMap<JobId, JobSnapshot>>,
    recorded: Mutex<Vec<RecordedJob>>,
    polls: Mutex<u64>,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock where every queue behaves the same
    pub fn with_default(behavior: MockBehavior) -> Self {
        let queue = Self::new();
        *queue.default_behavior.lock() = Some(behavior);
        queue
    }

    pub fn set_behavior(&self, queue_name: &str, behavior: MockBehavior) {
        self.behaviors.lock().insert(queue_name.to_string(), behavior);
    }

    pub fn recorded(&self) -> Vec<RecordedJob> {
        self.recorded.lock().clone()
    }

    pub fn recorded_for(&self, queue_name: &str) -> Vec<RecordedJob> {
        self.recorded
            .lock()
            .iter()
            .filter(|job| job.queue_name == queue_name)
            .cloned()
            .collect()
    }

    pub fn polls(&self) -> u64 {
        *self.polls.lock()
    }

    fn behavior_for(&self, queue_name: &str) -> MockBehavior {
        self.behaviors
            .lock()
            .get(queue_name)
            .cloned()
            .or_else(|| self.default_behavior.lock().clone())
            .unwrap_or(MockBehavior::EchoStepId)
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn add_job(
        &self,
        queue_name: &str,
        job: NewJob,
        options: JobOptions,
    ) -> Result<JobId, QueueError> {
        let behavior = self.behavior_for(queue_name);
        if matches!(behavior, MockBehavior::Reject) {
            return Err(QueueError::connection("mock queue rejected the job"));
        }

        let id = JobId::new(format!("mock-{}", self.recorded.lock().len() + 1));
        let (status, result, failed_reason, attempts) = match &behavior {
            MockBehavior::EchoStepId => (
                JobStatus::Completed,
                Some(job.payload["stepId"].clone()),
                None,
                1,
            ),
            MockBehavior::Complete(value) => (JobStatus::Completed, Some(value.clone()), None, 1),
            MockBehavior::Fail(reason) => (
                JobStatus::Failed,
                None,
                Some(reason.clone()),
                options.max_attempts,
            ),
            MockBehavior::Stuck | MockBehavior::Reject => (JobStatus::Active, None, None, 1),
        };

        let snapshot = JobSnapshot {
            id: id.clone(),
            queue_name: queue_name.to_string(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            priority: options.priority,
            status,
            result,
            failed_reason,
            attempts,
            max_attempts: options.max_attempts,
            created_at: Utc::now(),
            finished_at: status.is_terminal().then(Utc::now),
        };

        self.jobs.lock().insert(id.clone(), snapshot);
        self.recorded.lock().push(RecordedJob {
            queue_name: queue_name.to_string(),
            job,
            options,
        });
        Ok(id)
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, QueueError> {
        *self.polls.lock() += 1;
        Ok(self.jobs.lock().get(job_id).cloned())
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, QueueError> {
        let mut stats = QueueStats::new(queue_name);
        for job in self.jobs.lock().values().filter(|job| job.queue_name == queue_name) {
            match job.status {
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
