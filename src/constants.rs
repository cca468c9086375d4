//! # System Constants
//!
//! Operational defaults and well-known names for the pipeline orchestrator.
//! The values here seed [`crate::config::PipelineConfig::default`].

/// Default interval between two job status polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default upper bound on the time spent waiting for a single job
pub const DEFAULT_MAX_WAIT_MS: u64 = 300_000;

/// Default number of steps a pipeline run may execute at the same time
pub const DEFAULT_MAX_CONCURRENT_STEPS: usize = 1;

/// Default job priority; higher values are fetched first
pub const DEFAULT_JOB_PRIORITY: i32 = 0;

/// Default attempts a queued job gets before it is marked failed
pub const DEFAULT_JOB_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between job retries
pub const DEFAULT_JOB_BACKOFF_MS: u64 = 1_000;

/// Default number of concurrent workers per in-memory queue
pub const DEFAULT_WORKER_CONCURRENCY: usize = 2;

/// Interval at which idle in-memory queue workers look for new jobs
pub const DEFAULT_WORKER_IDLE_POLL_MS: u64 = 50;

/// How long the in-memory queue keeps completed and failed jobs
pub const DEFAULT_COMPLETED_RETENTION_MS: u64 = 3_600_000;

/// Upper bound on the interval between two sweeps of expired jobs
pub const RETENTION_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Well-known queue names used by the built-in step handlers
pub mod queues {
    pub const DOCUMENT_PROCESSING: &str = "document-processing";
    pub const REQUIREMENT_EXTRACTION: &str = "requirement-extraction";
    pub const ESTIMATION: &str = "estimation";
    pub const COMMUNICATION: &str = "communication";
    pub const CODEBASE_ANALYSIS: &str = "codebase-analysis";
    pub const FILE_OPERATIONS: &str = "file-operations";
    pub const NOTIFICATIONS: &str = "notifications";
}

/// Metadata keys attached to step results
pub mod metadata {
    pub const JOB_ID: &str = "jobId";
    pub const ATTEMPTS: &str = "attempts";
    pub const QUEUE_NAME: &str = "queueName";
    pub const SKIPPED: &str = "skipped";
    pub const FAILED_DEPENDENCY: &str = "failedDependency";
}

/// Step-level error messages that callers may match on
pub mod messages {
    pub const JOB_NOT_FOUND: &str = "Job not found";
    pub const JOB_FAILED: &str = "Job failed";
    pub const JOB_TIMEOUT: &str = "Job execution timeout";
    pub const NO_HANDLER: &str = "No handler registered for step type";
}
