//! End-to-end workflow tests: YAML loading, validation and queue-backed runs

mod common;

use common::{custom_type, echo_registry, InvocationLog};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tasker_pipeline::messaging::{InMemoryJobQueue, JobSnapshot};
use tasker_pipeline::orchestration::{
    OrchestrationError, Step, StepExecutionContext, StepExecutionResult, StepType,
    WorkflowDefinition, WorkflowOrchestrator, WorkflowStatus,
};
use tasker_pipeline::PipelineConfig;

const PROPOSAL_WORKFLOW: &str = r#"
id: proposal
name: Proposal generation
version: "1.2"
steps:
  - id: analyze
    type: document-analysis
    config:
      model: ${TASKER_PIPELINE_TEST_MODEL}
  - id: estimate
    type: estimation
    dependencies: [analyze]
    config:
      priority: 1
  - id: draft
    type: communication-generation
    dependencies: [estimate]
environments:
  production:
    steps:
      - id: estimate
        config:
          priority: 10
"#;

fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.execution.poll_interval_ms = 10;
    config.execution.max_wait_ms = 5_000;
    config.queue.worker_idle_poll_ms = 10;
    config
}

#[tokio::test]
async fn test_load_from_file_applies_environment_overrides() {
    std::env::set_var("TASKER_PIPELINE_TEST_MODEL", "claude-fast");
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(PROPOSAL_WORKFLOW.as_bytes()).unwrap();

    let definition = WorkflowDefinition::load_from_file(file.path(), "production")
        .await
        .unwrap();

    assert_eq!(definition.id, "proposal");
    assert_eq!(definition.name.as_deref(), Some("Proposal generation"));
    assert_eq!(definition.steps.len(), 3);
    assert_eq!(definition.steps[0].step_type, StepType::DocumentAnalysis);
    assert_eq!(definition.steps[0].config["model"], json!("claude-fast"));
    assert_eq!(definition.steps[1].config["priority"], json!(10));
    assert_eq!(definition.steps[2].dependencies, vec!["estimate".to_string()]);
    assert!(definition.validate().valid);
}

#[tokio::test]
async fn test_load_from_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let error = WorkflowDefinition::load_from_file(dir.path().join("absent.yaml"), "test")
        .await
        .unwrap_err();
    assert!(matches!(error, OrchestrationError::WorkflowLoadFailed { .. }));
}

#[tokio::test]
async fn test_invalid_workflow_is_rejected_before_any_step_runs() {
    let log = InvocationLog::new();
    let orchestrator = WorkflowOrchestrator::new(echo_registry(&log, &[]), fast_config());
    let definition = WorkflowDefinition::new(
        "broken",
        vec![
            Step::new("a", custom_type("test")).with_dependencies(["c"]),
            Step::new("b", custom_type("test")).with_dependencies(["a"]),
            Step::new("c", custom_type("test")).with_dependencies(["b"]),
        ],
    );

    let error = orchestrator
        .execute_workflow(&definition, json!({}))
        .await
        .unwrap_err();

    match error {
        OrchestrationError::InvalidWorkflow { workflow_id, errors } => {
            assert_eq!(workflow_id, "broken");
            assert!(errors.iter().any(|e| e.starts_with("Circular dependency detected")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_queue_backed_workflow_runs_end_to_end() {
    std::env::set_var("TASKER_PIPELINE_TEST_MODEL", "claude-fast");
    let config = fast_config();
    let queue = Arc::new(InMemoryJobQueue::from_config(&config.queue));

    queue.register_processor("document-processing", |job: JobSnapshot| async move {
        Ok::<_, anyhow::Error>(json!({
            "pages": 12,
            "model": job.payload["config"]["model"],
        }))
    });
    queue.register_processor("estimation", |job: JobSnapshot| async move {
        let pages = job.payload["dependencies"]["analyze"]["pages"]
            .as_i64()
            .unwrap_or_default();
        Ok::<_, anyhow::Error>(json!({"hours": pages * 2}))
    });
    queue.register_processor("communication", |job: JobSnapshot| async move {
        let hours = job.payload["dependencies"]["estimate"]["hours"].clone();
        Ok::<_, anyhow::Error>(json!({"body": format!("Estimated effort: {hours} hours")}))
    });
    queue.start();

    let orchestrator = WorkflowOrchestrator::with_job_queue(queue.clone(), config);
    let definition = WorkflowDefinition::from_yaml(PROPOSAL_WORKFLOW, "development").unwrap();

    let execution = orchestrator
        .execute_workflow(&definition, json!({"client": "acme"}))
        .await
        .unwrap();
    queue.shutdown().await;

    assert_eq!(execution.status, WorkflowStatus::Completed, "{:?}", execution.failed_steps());
    assert!(execution.is_success());
    assert_eq!(execution.workflow_id, "proposal");
    assert_eq!(
        execution.results["analyze"].output,
        Some(json!({"pages": 12, "model": "claude-fast"}))
    );
    assert_eq!(execution.results["estimate"].output, Some(json!({"hours": 24})));
    assert_eq!(
        execution.results["draft"].output,
        Some(json!({"body": "Estimated effort: 24 hours"}))
    );
    assert_eq!(execution.results["draft"].metadata["queueName"], json!("communication"));
}

#[tokio::test]
async fn test_failed_job_yields_partially_completed_run() {
    let mut config = fast_config();
    config.queue.default_max_attempts = 1;
    let queue = Arc::new(InMemoryJobQueue::from_config(&config.queue));
    queue.register_processor("estimation", |_job: JobSnapshot| async move {
        Ok::<_, anyhow::Error>(json!({"hours": 3}))
    });
    queue.register_processor("notifications", |_job: JobSnapshot| async move {
        Err::<serde_json::Value, _>(anyhow::anyhow!("smtp down"))
    });
    queue.start();

    let orchestrator = WorkflowOrchestrator::with_job_queue(queue.clone(), config);
    let definition = WorkflowDefinition::new(
        "notify-after-estimate",
        vec![
            Step::new("estimate", StepType::Estimation),
            Step::new("notify", StepType::Notification).with_dependencies(["estimate"]),
        ],
    );

    let execution = orchestrator
        .execute_workflow(&definition, json!({}))
        .await
        .unwrap();
    queue.shutdown().await;

    assert_eq!(execution.status, WorkflowStatus::PartiallyCompleted);
    assert_eq!(execution.failed_steps(), vec!["notify"]);
    assert_eq!(execution.results["notify"].error.as_deref(), Some("smtp down"));
}

#[tokio::test]
async fn test_custom_handlers_share_the_global_context() {
    let config = fast_config();
    let orchestrator = WorkflowOrchestrator::with_job_queue(
        Arc::new(InMemoryJobQueue::from_config(&config.queue)),
        config,
    );
    orchestrator.registry().register(
        custom_type("counter"),
        |context: StepExecutionContext, _step: Step| async move {
            let next = context.global_context.update("count", |current| {
                json!(current.and_then(|v| v.as_i64()).unwrap_or(0) + 1)
            });
            Ok::<_, anyhow::Error>(StepExecutionResult::success(next))
        },
    );

    let definition = WorkflowDefinition::new(
        "counting",
        vec![
            Step::new("one", custom_type("counter")),
            Step::new("two", custom_type("counter")).with_dependencies(["one"]),
        ],
    );
    let mut initial = HashMap::new();
    initial.insert("count".to_string(), json!(10));

    let execution = orchestrator
        .execute_workflow_with_context(&definition, json!({}), initial)
        .await
        .unwrap();

    assert!(execution.is_success());
    assert_eq!(execution.results["two"].output, Some(json!(12)));
    assert_eq!(execution.global_context["count"], json!(12));
}

#[tokio::test]
async fn test_each_run_gets_a_fresh_execution_id() {
    let log = InvocationLog::new();
    let orchestrator = WorkflowOrchestrator::new(echo_registry(&log, &[]), fast_config());
    let definition = WorkflowDefinition::new("twice", vec![Step::new("only", custom_type("test"))]);

    let first = orchestrator.execute_workflow(&definition, json!({})).await.unwrap();
    let second = orchestrator.execute_workflow(&definition, json!({})).await.unwrap();

    assert_ne!(first.execution_id, second.execution_id);
    assert_eq!(log.count("only"), 2);
}
