//! # Step Handler
//!
//! Extension point that performs the actual work of a step. Handlers are user
//! code: they return `anyhow::Result` and may fail or panic freely, because the
//! [`StepExecutor`](super::step_executor::StepExecutor) normalizes every outcome.
//!
//! ## Usage Pattern:
//!
//! ```rust
//! use tasker_pipeline::orchestration::{Step, StepExecutionContext, StepExecutionResult, StepHandler};
//! use async_trait::async_trait;
//!
//! struct EchoStepId;
//!
//! #[async_trait]
//! impl StepHandler for EchoStepId {
//!     async fn handle(
//!         &self,
//!         _context: &StepExecutionContext,
//!         step: &Step,
//!     ) -> anyhow::Result<StepExecutionResult> {
//!         Ok(StepExecutionResult::success(serde_json::json!(step.id)))
//!     }
//! }
//! ```

use crate::orchestration::context::StepExecutionContext;
use crate::orchestration::types::{Step, StepExecutionResult};
use async_trait::async_trait;
use std::future::Future;

/// Async handler invoked for every step of a registered [`StepType`](super::types::StepType)
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Perform the step; `context.previous_results` holds its dependencies' results
    async fn handle(
        &self,
        context: &StepExecutionContext,
        step: &Step,
    ) -> anyhow::Result<StepExecutionResult>;

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Closures taking owned copies of the context and step are handlers too
#[async_trait]
impl<F, Fut> StepHandler for F
where
    F: Fn(StepExecutionContext, Step) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<StepExecutionResult>> + Send + 'static,
{
    async fn handle(
        &self,
        context: &StepExecutionContext,
        step: &Step,
    ) -> anyhow::Result<StepExecutionResult> {
        (self)(context.clone(), step.clone()).await
    }

    fn name(&self) -> &str {
        "closure"
    }
}
