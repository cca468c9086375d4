//! # Queue-Backed Step Handlers
//!
//! Built-in handlers for every built-in [`StepType`]. Each one enqueues a job
//! on the queue configured for its type and waits for the job to finish
//! through a [`JobCompletionWaiter`]. The handlers differ only in queue name;
//! the payload shape is shared:
//!
//! ```json
//! {
//!   "workflowId": "...", "executionId": "...", "stepId": "...",
//!   "stepType": "estimation", "config": {...}, "input": {...},
//!   "dependencies": { "<step id>": <output or null> }
//! }
//! ```
//!
//! Per-step job options come from the step config: `priority`,
//! `max_attempts` and `delay_ms` override the queue defaults.

use crate::config::PipelineConfig;
use crate::constants::metadata;
use crate::messaging::{JobOptions, JobQueue, NewJob};
use crate::orchestration::context::StepExecutionContext;
use crate::orchestration::job_waiter::JobCompletionWaiter;
use crate::orchestration::registry::StepHandlerRegistry;
use crate::orchestration::step_handler::StepHandler;
use crate::orchestration::types::{Step, StepExecutionResult, StepType};
use crate::utils::serde::coerce_i32;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Dispatches a step to a job queue and waits for its completion
#[derive(Debug, Clone)]
pub struct QueueBackedHandler {
    step_type: StepType,
    queue_name: String,
    waiter: JobCompletionWaiter,
    default_options: JobOptions,
}

impl QueueBackedHandler {
    pub fn new(
        step_type: StepType,
        queue_name: impl Into<String>,
        waiter: JobCompletionWaiter,
        default_options: JobOptions,
    ) -> Self {
        Self {
            step_type,
            queue_name: queue_name.into(),
            waiter,
            default_options,
        }
    }

    pub fn step_type(&self) -> &StepType {
        &self.step_type
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn queue(&self) -> &Arc<dyn JobQueue> {
        self.waiter.queue()
    }

    /// Job payload for `step` within `context`
    pub fn build_payload(&self, context: &StepExecutionContext, step: &Step) -> serde_json::Value {
        let dependencies: serde_json::Map<String, serde_json::Value> = step
            .dependencies
            .iter()
            .map(|dependency| {
                let output = context
                    .previous_results
                    .get(dependency)
                    .and_then(|result| result.output.clone())
                    .unwrap_or(serde_json::Value::Null);
                (dependency.clone(), output)
            })
            .collect();

        json!({
            "workflowId": context.workflow_id,
            "executionId": context.execution_id,
            "stepId": step.id,
            "stepType": step.step_type.as_str(),
            "config": step.config,
            "input": context.input,
            "dependencies": dependencies,
        })
    }

    /// Queue defaults overridden by the step's own config
    pub fn job_options(&self, step: &Step) -> JobOptions {
        let mut options = self.default_options.clone();

        if let Some(priority) = step.config.get("priority").and_then(coerce_i32) {
            options = options.with_priority(priority);
        }
        if let Some(max_attempts) = step
            .config
            .get("max_attempts")
            .and_then(coerce_i32)
            .and_then(|attempts| u32::try_from(attempts).ok())
        {
            options = options.with_max_attempts(max_attempts);
        }
        if let Some(delay_ms) = step
            .config
            .get("delay_ms")
            .and_then(coerce_i32)
            .and_then(|delay| u64::try_from(delay).ok())
        {
            options = options.with_delay(Duration::from_millis(delay_ms));
        }

        options
    }
}

#[async_trait]
impl StepHandler for QueueBackedHandler {
    async fn handle(
        &self,
        context: &StepExecutionContext,
        step: &Step,
    ) -> anyhow::Result<StepExecutionResult> {
        let payload = self.build_payload(context, step);
        let options = self.job_options(step);

        let job_id = self
            .queue()
            .add_job(
                &self.queue_name,
                NewJob::new(step.step_type.as_str(), payload),
                options,
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to enqueue step {} on queue {}",
                    step.id, self.queue_name
                )
            })?;

        debug!(
            step_id = %step.id,
            queue_name = %self.queue_name,
            job_id = %job_id,
            provider = self.queue().provider_name(),
            "Enqueued step job"
        );

        let result = self
            .waiter
            .wait_for_job_completion(&job_id)
            .await
            .with_metadata(metadata::QUEUE_NAME, json!(self.queue_name));
        Ok(result)
    }

    fn name(&self) -> &str {
        "queue-backed"
    }
}

/// Register a [`QueueBackedHandler`] for every built-in step type
///
/// Queue names, job defaults and waiter timing come from `config`.
pub fn register_builtin_handlers(
    registry: &StepHandlerRegistry,
    queue: Arc<dyn JobQueue>,
    config: &PipelineConfig,
) {
    let waiter = JobCompletionWaiter::from_config(queue, &config.execution);
    let default_options = JobOptions::from_config(&config.queue);

    let entries = config.queue.queues.entries();
    let count = entries.len();
    for (step_type, queue_name) in entries {
        let handler = QueueBackedHandler::new(
            step_type.clone(),
            queue_name,
            waiter.clone(),
            default_options.clone(),
        );
        registry.register(step_type, handler);
    }

    info!(handlers = count, "Registered built-in queue-backed step handlers");
}
