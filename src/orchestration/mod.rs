//! # Orchestration Engine
//!
//! Dependency-ordered execution of workflow steps.
//!
//! ## Core Components
//!
//! - **DependencyGraph**: validates a step set (dangling references, duplicate
//!   ids, cycles) and derives a topological order
//! - **StepHandlerRegistry**: maps each [`StepType`] to its [`StepHandler`]
//! - **StepExecutor**: runs one step and normalizes every outcome into a
//!   [`StepExecutionResult`]
//! - **JobCompletionWaiter**: polls the job queue until a dispatched job is
//!   terminal or the wait budget runs out
//! - **QueueBackedHandler**: built-in handlers that dispatch steps as jobs
//! - **PipelineRunner**: runs steps dependencies-first, sequentially or with
//!   bounded concurrency
//! - **WorkflowOrchestrator**: validates and runs whole workflow definitions

pub mod context;
pub mod errors;
pub mod graph;
pub mod handlers;
pub mod job_waiter;
pub mod pipeline;
pub mod registry;
pub mod step_executor;
pub mod step_handler;
pub mod types;
pub mod workflow;

// Re-export core types and components for easy access
pub use context::{GlobalContext, StepExecutionContext};
pub use errors::{OrchestrationError, OrchestrationResult};
pub use graph::{validate, DependencyGraph, ValidationReport};
pub use handlers::{register_builtin_handlers, QueueBackedHandler};
pub use job_waiter::JobCompletionWaiter;
pub use pipeline::PipelineRunner;
pub use registry::{RegistryStats, StepHandlerRegistry};
pub use step_executor::{ExecutionStats, StepExecutor};
pub use step_handler::StepHandler;
pub use types::{DependencyFailurePolicy, ExecutionResults, Step, StepExecutionResult, StepType};
pub use workflow::{
    EnvironmentOverrides, StepOverride, WorkflowDefinition, WorkflowExecution,
    WorkflowOrchestrator, WorkflowStatus,
};
