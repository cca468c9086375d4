#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Pipeline
//!
//! Dependency-ordered workflow step execution over pluggable job queues.
//!
//! ## Overview
//!
//! A workflow is a set of typed steps with declared dependencies. The
//! orchestrator validates the dependency graph, then runs every step after its
//! dependencies have produced a terminal result. Built-in step types dispatch
//! their work to a job queue and poll for completion; custom step types plug
//! in through the handler registry.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Graph validation, handlers, executor, pipeline runner and workflow facade
//! - [`messaging`] - Job queue contract and the in-memory provider
//! - [`config`] - Layered configuration loading
//! - [`error`] - Crate-level error type
//! - [`logging`] - Structured logging setup and helpers
//! - [`constants`] - Defaults and well-known names
//!
//! ## Quick Start
//!
//! ```rust
//! use tasker_pipeline::config::PipelineConfig;
//! use tasker_pipeline::messaging::{InMemoryJobQueue, JobSnapshot};
//! use tasker_pipeline::orchestration::{WorkflowDefinition, WorkflowOrchestrator, WorkflowStatus};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let queue = Arc::new(InMemoryJobQueue::new());
//! queue.register_processor("document-processing", |job: JobSnapshot| async move {
//!     Ok::<_, anyhow::Error>(serde_json::json!({"pages": 12, "step": job.payload["stepId"]}))
//! });
//! queue.register_processor("estimation", |_job: JobSnapshot| async move {
//!     Ok::<_, anyhow::Error>(serde_json::json!({"hours": 40}))
//! });
//! queue.start();
//!
//! let mut config = PipelineConfig::default();
//! config.execution.poll_interval_ms = 10;
//!
//! let definition = WorkflowDefinition::from_yaml(
//!     r#"
//! id: proposal
//! steps:
//!   - id: analyze
//!     type: document-analysis
//!   - id: estimate
//!     type: estimation
//!     dependencies: [analyze]
//! "#,
//!     "development",
//! )
//! .unwrap();
//!
//! let orchestrator = WorkflowOrchestrator::with_job_queue(queue.clone(), config);
//! let execution = orchestrator
//!     .execute_workflow(&definition, serde_json::json!({"document": "rfp.pdf"}))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(execution.status, WorkflowStatus::Completed);
//! queue.shutdown().await;
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod orchestration;
pub mod utils;

pub use config::{ConfigManager, ExecutionConfig, LoggingConfig, PipelineConfig, QueueConfig};
pub use error::{Result, TaskerError};
pub use messaging::{InMemoryJobQueue, JobQueue, QueueError};
pub use orchestration::{
    DependencyFailurePolicy, Step, StepExecutionContext, StepExecutionResult, StepHandler,
    StepType, WorkflowDefinition, WorkflowOrchestrator,
};
