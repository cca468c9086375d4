//! # Step Executor
//!
//! Runs a single step and normalizes whatever happens into a
//! [`StepExecutionResult`].
//!
//! ## Execution sequence
//!
//! 1. Every declared dependency must already be present in
//!    `context.previous_results`; otherwise the step fails fast listing the
//!    missing ids.
//! 2. The handler for the step's type is resolved from the registry. A missing
//!    handler is a configuration error and fails the step.
//! 3. The handler runs. An `Err` or a panic becomes a failed result carrying
//!    the message.
//! 4. `duration` is always set to the wall-clock time spent in the executor.
//!
//! Nothing escapes [`StepExecutor::execute_step`]: callers only ever see a
//! result value.

use crate::constants::messages;
use crate::logging::log_step_operation;
use crate::orchestration::context::StepExecutionContext;
use crate::orchestration::registry::StepHandlerRegistry;
use crate::orchestration::types::{Step, StepExecutionResult};
use crate::utils::panic_message;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Counters for executed steps and their outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Failures caused by a handler panic
    pub panicked: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    executed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

/// Executes one step against the handler registered for its type
#[derive(Debug, Clone)]
pub struct StepExecutor {
    registry: Arc<StepHandlerRegistry>,
    stats: Arc<StatsCounters>,
}

impl StepExecutor {
    pub fn new(registry: Arc<StepHandlerRegistry>) -> Self {
        Self {
            registry,
            stats: Arc::new(StatsCounters::default()),
        }
    }

    pub fn registry(&self) -> &Arc<StepHandlerRegistry> {
        &self.registry
    }

    #[instrument(skip_all, fields(step_id = %step.id, step_type = %step.step_type))]
    pub async fn execute_step(
        &self,
        step: &Step,
        context: &StepExecutionContext,
    ) -> StepExecutionResult {
        let started = Instant::now();
        self.stats.executed.fetch_add(1, Ordering::Relaxed);

        let result = self.run(step, context).await.with_duration(started.elapsed());

        if result.success {
            self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }

        log_step_operation(
            "execute_step",
            Some(&context.execution_id),
            &step.id,
            Some(step.step_type.as_str()),
            if result.success { "completed" } else { "failed" },
            Some(result.duration.as_millis() as u64),
            result.error.as_deref(),
        );

        result
    }

    async fn run(&self, step: &Step, context: &StepExecutionContext) -> StepExecutionResult {
        let missing: Vec<&str> = step
            .dependencies
            .iter()
            .filter(|dependency| !context.previous_results.contains_key(*dependency))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            warn!(
                step_id = %step.id,
                missing = ?missing,
                "Step invoked before its dependencies produced results"
            );
            return StepExecutionResult::failure(format!(
                "Missing dependencies for step {}: {}",
                step.id,
                missing.join(", ")
            ));
        }

        let Some(handler) = self.registry.get(&step.step_type) else {
            return StepExecutionResult::failure(format!(
                "{}: {}",
                messages::NO_HANDLER,
                step.step_type
            ));
        };

        debug!(step_id = %step.id, handler = %handler.name(), "Invoking step handler");

        // `handle` itself may panic before returning its future
        match AssertUnwindSafe(async { handler.handle(context, step).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => StepExecutionResult::failure(format!("{error:#}")),
            Err(payload) => {
                self.stats.panicked.fetch_add(1, Ordering::Relaxed);
                let message = panic_message(payload.as_ref());
                warn!(step_id = %step.id, panic = %message, "Step handler panicked");
                StepExecutionResult::failure(format!("Step handler panicked: {message}"))
            }
        }
    }

    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            executed: self.stats.executed.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            panicked: self.stats.panicked.load(Ordering::Relaxed),
        }
    }
}
