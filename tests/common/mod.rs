//! Shared helpers for integration tests
//!
//! Step builders, recording handlers and proptest strategies used across the
//! integration suites.

#![allow(dead_code)]

pub mod strategies;

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tasker_pipeline::orchestration::{
    GlobalContext, PipelineRunner, Step, StepExecutionContext, StepExecutionResult,
    StepExecutor, StepHandlerRegistry, StepType,
};

/// Initialize test logging once; respects `RUST_LOG`
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn custom_type(tag: &str) -> StepType {
    tag.parse().expect("non-empty step type tag")
}

/// Step of custom type `test` with the given dependencies
pub fn test_step(id: &str, dependencies: &[&str]) -> Step {
    Step::new(id, custom_type("test")).with_dependencies(dependencies.iter().copied())
}

pub fn base_context() -> StepExecutionContext {
    StepExecutionContext::new(
        "integration-workflow",
        "integration-exec",
        json!({"source": "integration"}),
        Arc::new(GlobalContext::new()),
    )
}

/// Records the order in which steps were invoked
#[derive(Debug, Clone, Default)]
pub struct InvocationLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl InvocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, step_id: &str) {
        self.entries.lock().push(step_id.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn position(&self, step_id: &str) -> Option<usize> {
        self.entries.lock().iter().position(|entry| entry == step_id)
    }

    pub fn count(&self, step_id: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.as_str() == step_id)
            .count()
    }
}

/// Registry with a handler for `test` steps that echoes the step id as output
///
/// Steps listed in `failing` return a failed result instead.
pub fn echo_registry(log: &InvocationLog, failing: &[&str]) -> Arc<StepHandlerRegistry> {
    let registry = Arc::new(StepHandlerRegistry::new());
    let log = log.clone();
    let failing: Vec<String> = failing.iter().map(|id| id.to_string()).collect();

    registry.register(
        custom_type("test"),
        move |_context: StepExecutionContext, step: Step| {
            let log = log.clone();
            let fail = failing.contains(&step.id);
            async move {
                log.record(&step.id);
                if fail {
                    Ok::<_, anyhow::Error>(StepExecutionResult::failure(format!(
                        "{} failed on purpose",
                        step.id
                    )))
                } else {
                    Ok(StepExecutionResult::success(json!(step.id)))
                }
            }
        },
    );
    registry
}

pub fn runner(registry: Arc<StepHandlerRegistry>) -> PipelineRunner {
    PipelineRunner::new(StepExecutor::new(registry))
}
