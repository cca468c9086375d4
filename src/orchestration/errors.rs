//! # Orchestration Errors
//!
//! Errors surfaced by the workflow facade and workflow loading. Step-level
//! failures never appear here: the executor folds them into
//! [`StepExecutionResult`](super::types::StepExecutionResult) values.

use crate::config::ConfigurationError;
use crate::messaging::QueueError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestrationError {
    /// Dependency graph failed validation before any step ran
    #[error("Workflow {workflow_id} is invalid: {}", errors.join("; "))]
    InvalidWorkflow {
        workflow_id: String,
        errors: Vec<String>,
    },

    /// Workflow definition could not be read or parsed
    #[error("Failed to load workflow definition from {source_description}: {reason}")]
    WorkflowLoadFailed {
        source_description: String,
        reason: String,
    },

    /// Configuration problem, such as a missing queue name for a step type
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Queue error: {0}")]
    QueueError(String),
}

impl OrchestrationError {
    pub fn invalid_workflow(workflow_id: impl Into<String>, errors: Vec<String>) -> Self {
        Self::InvalidWorkflow {
            workflow_id: workflow_id.into(),
            errors,
        }
    }

    pub fn workflow_load_failed(
        source_description: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::WorkflowLoadFailed {
            source_description: source_description.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigurationError> for OrchestrationError {
    fn from(error: ConfigurationError) -> Self {
        OrchestrationError::ConfigurationError(error.to_string())
    }
}

impl From<QueueError> for OrchestrationError {
    fn from(error: QueueError) -> Self {
        OrchestrationError::QueueError(error.to_string())
    }
}

/// Result type for orchestration operations
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
