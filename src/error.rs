//! Error types for the Tasker pipeline crate.
//!

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskerError {
    #[error("Orchestration error: {0}")]
    OrchestrationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Queue error: {0}")]
    QueueError(String),
}

impl From<serde_json::Error> for TaskerError {
    fn from(error: serde_json::Error) -> Self {
        TaskerError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<crate::messaging::QueueError> for TaskerError {
    fn from(error: crate::messaging::QueueError) -> Self {
        TaskerError::QueueError(error.to_string())
    }
}

impl From<crate::config::ConfigurationError> for TaskerError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        TaskerError::ConfigurationError(error.to_string())
    }
}

impl From<crate::orchestration::errors::OrchestrationError> for TaskerError {
    fn from(error: crate::orchestration::errors::OrchestrationError) -> Self {
        TaskerError::OrchestrationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaskerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::QueueError;

    #[test]
    fn test_queue_error_conversion_keeps_message() {
        let err: TaskerError = QueueError::queue_not_found("estimation").into();
        assert_eq!(err.to_string(), "Queue error: Queue not found: estimation");
    }

    #[test]
    fn test_layer_errors_convert_with_question_mark() {
        fn load() -> Result<()> {
            Err(crate::config::ConfigurationError::invalid_value(
                "queue.worker_concurrency",
                "0",
                "each queue needs at least one worker",
            ))?;
            Ok(())
        }

        let err = load().unwrap_err();
        assert!(matches!(err, TaskerError::ConfigurationError(_)));
        assert!(err.to_string().contains("queue.worker_concurrency"));
    }

    #[test]
    fn test_orchestration_error_conversion() {
        let err: TaskerError =
            crate::orchestration::errors::OrchestrationError::invalid_workflow("wf", vec!["bad".into()]).into();
        assert_eq!(err.to_string(), "Orchestration error: Workflow wf is invalid: bad");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = TaskerError::from(parse_err);
        assert!(matches!(err, TaskerError::ValidationError(_)));
    }
}
