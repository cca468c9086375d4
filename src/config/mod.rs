//! # Pipeline Configuration System
//!
//! Typed configuration for the orchestrator, the job-completion waiter and the
//! in-memory queue. Values are layered by [`ConfigManager`]: built-in defaults,
//! then `config/tasker-pipeline.{toml,yaml}`, then `config/tasker-pipeline-<env>.*`,
//! then `TASKER_PIPELINE__SECTION__KEY` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_pipeline::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let poll_interval = manager.config().execution.poll_interval();
//! let estimation_queue = &manager.config().queue.queues.estimation;
//! # let _ = (poll_interval, estimation_queue);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants;
use crate::messaging::BackoffType;
use crate::orchestration::types::{DependencyFailurePolicy, StepType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `tasker-pipeline.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Step execution and completion-waiting settings
    pub execution: ExecutionConfig,

    /// Job queue settings used by built-in handlers and the in-memory queue
    pub queue: QueueConfig,

    /// Logging output settings
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.execution.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.poll_interval_ms",
                "0",
                "poll interval must be greater than zero",
            ));
        }

        if self.execution.max_wait_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_wait_ms",
                "0",
                "maximum wait must be greater than zero",
            ));
        }

        if self.execution.max_concurrent_steps == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_concurrent_steps",
                "0",
                "at least one step must be allowed to run",
            ));
        }

        if self.queue.default_max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.default_max_attempts",
                "0",
                "jobs need at least one attempt",
            ));
        }

        if self.queue.worker_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.worker_concurrency",
                "0",
                "each queue needs at least one worker",
            ));
        }

        if self.queue.completed_retention_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.completed_retention_ms",
                "0",
                "finished jobs must stay readable until their waiter polls them",
            ));
        }

        for (step_type, queue_name) in self.queue.queues.entries() {
            if queue_name.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    format!("queue.queues.{}", step_type.as_str().replace('-', "_")),
                    "queue configuration",
                ));
            }
        }

        Ok(())
    }
}

/// Step execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fixed interval between two job status polls
    pub poll_interval_ms: u64,
    /// Maximum total time spent waiting for one job
    pub max_wait_ms: u64,
    /// Steps that may run at the same time within one pipeline run
    pub max_concurrent_steps: usize,
    /// What happens to dependents of a failed step
    pub on_dependency_failure: DependencyFailurePolicy,
}

impl ExecutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            max_wait_ms: constants::DEFAULT_MAX_WAIT_MS,
            max_concurrent_steps: constants::DEFAULT_MAX_CONCURRENT_STEPS,
            on_dependency_failure: DependencyFailurePolicy::default(),
        }
    }
}

/// Job queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub default_priority: i32,
    pub default_max_attempts: u32,
    pub backoff_type: BackoffType,
    pub backoff_ms: u64,
    /// Workers spawned per queue by the in-memory queue
    pub worker_concurrency: usize,
    /// How long an idle in-memory worker sleeps before looking again
    pub worker_idle_poll_ms: u64,
    /// How long finished jobs stay readable before the in-memory queue drops them
    pub completed_retention_ms: u64,
    /// Queue used by each built-in step type
    pub queues: StepQueueNames,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_priority: constants::DEFAULT_JOB_PRIORITY,
            default_max_attempts: constants::DEFAULT_JOB_MAX_ATTEMPTS,
            backoff_type: BackoffType::Exponential,
            backoff_ms: constants::DEFAULT_JOB_BACKOFF_MS,
            worker_concurrency: constants::DEFAULT_WORKER_CONCURRENCY,
            worker_idle_poll_ms: constants::DEFAULT_WORKER_IDLE_POLL_MS,
            completed_retention_ms: constants::DEFAULT_COMPLETED_RETENTION_MS,
            queues: StepQueueNames::default(),
        }
    }
}

/// Queue names for the built-in step types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepQueueNames {
    pub document_analysis: String,
    pub requirement_extraction: String,
    pub estimation: String,
    pub communication_generation: String,
    pub codebase_analysis: String,
    pub file_operation: String,
    pub notification: String,
}

impl StepQueueNames {
    /// Queue for a step type; `None` for custom step types
    pub fn queue_for(&self, step_type: &StepType) -> Option<&str> {
        let name = match step_type {
            StepType::DocumentAnalysis => &self.document_analysis,
            StepType::RequirementExtraction => &self.requirement_extraction,
            StepType::Estimation => &self.estimation,
            StepType::CommunicationGeneration => &self.communication_generation,
            StepType::CodebaseAnalysis => &self.codebase_analysis,
            StepType::FileOperation => &self.file_operation,
            StepType::Notification => &self.notification,
            StepType::Custom(_) => return None,
        };
        Some(name.as_str())
    }

    /// Every built-in step type paired with its queue name
    pub fn entries(&self) -> Vec<(StepType, &str)> {
        StepType::builtin()
            .into_iter()
            .filter_map(|step_type| {
                self.queue_for(&step_type)
                    .map(|queue_name| (step_type.clone(), queue_name))
            })
            .collect()
    }

    /// Distinct queue names, in built-in step type order
    pub fn distinct(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (_, queue_name) in self.entries() {
            if !names.iter().any(|existing| existing == queue_name) {
                names.push(queue_name.to_string());
            }
        }
        names
    }
}

impl Default for StepQueueNames {
    fn default() -> Self {
        use constants::queues;

        Self {
            document_analysis: queues::DOCUMENT_PROCESSING.to_string(),
            requirement_extraction: queues::REQUIREMENT_EXTRACTION.to_string(),
            estimation: queues::ESTIMATION.to_string(),
            communication_generation: queues::COMMUNICATION.to_string(),
            codebase_analysis: queues::CODEBASE_ANALYSIS.to_string(),
            file_operation: queues::FILE_OPERATIONS.to_string(),
            notification: queues::NOTIFICATIONS.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter directive; falls back to the environment default
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            json: false,
            ansi: true,
        }
    }
}
