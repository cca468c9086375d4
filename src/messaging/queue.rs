//! # Job Queue Contract
//!
//! Provider-agnostic job queue operations consumed by the orchestrator.
//!
//! The orchestrator never owns job state. Queue-backed step handlers enqueue a
//! job through [`JobQueue::add_job`], keep the returned [`JobId`], and observe
//! progress only through [`JobQueue::get_job`]. Jobs move
//! `waiting → active → completed | failed`; retries move a failed attempt back
//! to `waiting` until `max_attempts` is exhausted.

use crate::config::QueueConfig;
use crate::constants;
use crate::messaging::QueueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier assigned to a job at enqueue time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    /// No further transition happens from a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// How the delay between two attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    Fixed,
    Exponential,
}

/// Retry backoff policy for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobBackoff {
    pub backoff_type: BackoffType,
    pub delay_ms: u64,
}

impl JobBackoff {
    /// Delay before the retry that follows `attempt` (1-based) failed attempts
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = match self.backoff_type {
            BackoffType::Fixed => self.delay_ms,
            BackoffType::Exponential => {
                let exponent = attempt.saturating_sub(1).min(32);
                self.delay_ms.saturating_mul(1u64 << exponent)
            }
        };
        Duration::from_millis(delay_ms)
    }
}

impl Default for JobBackoff {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            delay_ms: constants::DEFAULT_JOB_BACKOFF_MS,
        }
    }
}

/// Enqueue-time options: priority, scheduling and retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Higher priorities are picked up first
    pub priority: i32,
    /// Job becomes eligible only after this delay
    pub delay: Option<Duration>,
    pub max_attempts: u32,
    pub backoff: JobBackoff,
}

impl JobOptions {
    /// Options seeded from queue configuration
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            priority: config.default_priority,
            delay: None,
            max_attempts: config.default_max_attempts,
            backoff: JobBackoff {
                backoff_type: config.backoff_type,
                delay_ms: config.backoff_ms,
            },
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: JobBackoff) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: constants::DEFAULT_JOB_PRIORITY,
            delay: None,
            max_attempts: constants::DEFAULT_JOB_MAX_ATTEMPTS,
            backoff: JobBackoff::default(),
        }
    }
}

/// Job data supplied at enqueue time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: String,
    pub payload: serde_json::Value,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
        }
    }
}

/// Point-in-time view of a job as reported by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub queue_name: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub failed_reason: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Per-queue job counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }

    pub fn total(&self) -> u64 {
        self.waiting + self.active + self.completed + self.failed
    }
}

/// Core job queue trait - provider-agnostic operations
///
/// Implementations provide the actual backend. The orchestrator depends only
/// on this trait, so any queue that can hand out job ids and report status by
/// id can back queue-backed step handlers.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Enqueue a job and return the id assigned by the provider
    async fn add_job(
        &self,
        queue_name: &str,
        job: NewJob,
        options: JobOptions,
    ) -> Result<JobId, QueueError>;

    /// Fetch a job by id; `None` once the job no longer exists
    async fn get_job(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, QueueError>;

    /// Job counts for backpressure and diagnostics
    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, QueueError>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
