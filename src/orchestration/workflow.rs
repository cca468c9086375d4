//! # Workflow Orchestrator
//!
//! Workflow definitions and the facade that runs them.
//!
//! A [`WorkflowDefinition`] is loaded from YAML with `${VAR}` environment
//! interpolation and optional per-environment step config overrides.
//! Interpolation runs on parsed string values, so a variable never changes
//! the document's structure and always yields a string:
//!
//! ```yaml
//! id: proposal
//! steps:
//!   - id: analyze
//!     type: document-analysis
//!     config:
//!       model: ${ANALYSIS_MODEL}
//!   - id: estimate
//!     type: estimation
//!     dependencies: [analyze]
//! environments:
//!   production:
//!     steps:
//!       - id: estimate
//!         config:
//!           priority: 10
//! ```
//!
//! [`WorkflowOrchestrator::execute_workflow`] validates the definition, then
//! runs it under a fresh execution id with its own [`GlobalContext`].

use crate::config::PipelineConfig;
use crate::logging::{log_error, log_workflow_operation};
use crate::messaging::JobQueue;
use crate::orchestration::context::{GlobalContext, StepExecutionContext};
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::orchestration::graph::{self, ValidationReport};
use crate::orchestration::handlers::register_builtin_handlers;
use crate::orchestration::pipeline::PipelineRunner;
use crate::orchestration::registry::StepHandlerRegistry;
use crate::orchestration::step_executor::StepExecutor;
use crate::orchestration::types::{ExecutionResults, Step};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Step config override applied for one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOverride {
    pub id: String,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentOverrides {
    #[serde(default)]
    pub steps: Vec<StepOverride>,
}

/// A named, validated-before-run set of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub environments: Option<HashMap<String, EnvironmentOverrides>>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            version: None,
            steps,
            environments: None,
        }
    }

    /// Load a workflow definition from a YAML file
    #[instrument]
    pub async fn load_from_file<P: AsRef<Path> + std::fmt::Debug>(
        path: P,
        environment: &str,
    ) -> OrchestrationResult<Self> {
        let path = path.as_ref();
        info!("Loading workflow definition from: {:?}", path);

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            OrchestrationError::workflow_load_failed(
                format!("{path:?}"),
                format!("Failed to read workflow file: {e}"),
            )
        })?;

        Self::parse(&content, environment, &format!("{path:?}"))
    }

    /// Load a workflow definition from a YAML string
    pub fn from_yaml(yaml_content: &str, environment: &str) -> OrchestrationResult<Self> {
        Self::parse(yaml_content, environment, "yaml_string")
    }

    fn parse(
        yaml_content: &str,
        environment: &str,
        source_description: &str,
    ) -> OrchestrationResult<Self> {
        let parse_error = |e: serde_yaml::Error| {
            OrchestrationError::workflow_load_failed(
                source_description,
                format!("Failed to parse workflow YAML: {e}"),
            )
        };
        let mut document: serde_yaml::Value = serde_yaml::from_str(yaml_content).map_err(parse_error)?;
        interpolate_env_vars(&mut document);
        let mut definition: WorkflowDefinition = serde_yaml::from_value(document).map_err(parse_error)?;

        definition.apply_environment_overrides(environment);
        debug!(
            workflow_id = %definition.id,
            steps = definition.steps.len(),
            "Workflow definition loaded"
        );
        Ok(definition)
    }

    /// Merge the overrides for `environment` into matching step configs
    ///
    /// Object configs are merged key by key; any other override replaces the
    /// step's config outright.
    pub fn apply_environment_overrides(&mut self, environment: &str) {
        let Some(overrides) = self
            .environments
            .as_ref()
            .and_then(|environments| environments.get(environment))
            .cloned()
        else {
            return;
        };

        for step_override in overrides.steps {
            let Some(step) = self.steps.iter_mut().find(|s| s.id == step_override.id) else {
                continue;
            };

            match (&mut step.config, step_override.config) {
                (serde_json::Value::Object(existing), serde_json::Value::Object(updates)) => {
                    existing.extend(updates);
                }
                (config, replacement) => *config = replacement,
            }
        }
    }

    /// Structural checks plus dependency graph validation
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push("Workflow id cannot be empty".to_string());
        }
        for (position, step) in self.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                errors.push(format!("Step at position {position} has an empty id"));
            }
        }

        let graph_report = graph::validate(&self.steps);
        errors.extend(graph_report.errors);

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }
}

static INTERPOLATION_PATTERN: OnceLock<Regex> = OnceLock::new();

fn interpolation_pattern() -> &'static Regex {
    INTERPOLATION_PATTERN
        .get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("interpolation pattern must compile"))
}

/// Replace `${VAR}` in every string value, leaving unknown variables as-is
fn interpolate_env_vars(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::String(text) => {
            if let std::borrow::Cow::Owned(replaced) = interpolate_str(text) {
                *text = replaced;
            }
        }
        serde_yaml::Value::Sequence(items) => items.iter_mut().for_each(interpolate_env_vars),
        serde_yaml::Value::Mapping(mapping) => {
            mapping.values_mut().for_each(interpolate_env_vars);
        }
        serde_yaml::Value::Tagged(tagged) => interpolate_env_vars(&mut tagged.value),
        _ => {}
    }
}

fn interpolate_str(template: &str) -> std::borrow::Cow<'_, str> {
    interpolation_pattern().replace_all(template, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{var_name}}}"))
    })
}

/// Overall outcome of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Every step succeeded
    Completed,
    /// No step succeeded
    Failed,
    PartiallyCompleted,
}

impl WorkflowStatus {
    fn from_results(results: &ExecutionResults, step_count: usize) -> Self {
        let succeeded = results.values().filter(|result| result.success).count();
        if succeeded == step_count && results.len() == step_count {
            WorkflowStatus::Completed
        } else if succeeded == 0 {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::PartiallyCompleted
        }
    }
}

/// Record of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub results: ExecutionResults,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Global context contents when the run finished
    pub global_context: HashMap<String, serde_json::Value>,
}

impl WorkflowExecution {
    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    /// Ids of failed steps, sorted
    pub fn failed_steps(&self) -> Vec<&str> {
        let mut failed: Vec<&str> = self
            .results
            .iter()
            .filter(|(_, result)| !result.success)
            .map(|(id, _)| id.as_str())
            .collect();
        failed.sort_unstable();
        failed
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Validates and runs workflow definitions
#[derive(Debug, Clone)]
pub struct WorkflowOrchestrator {
    registry: Arc<StepHandlerRegistry>,
    runner: PipelineRunner,
    config: PipelineConfig,
}

impl WorkflowOrchestrator {
    /// Orchestrator over an existing registry
    pub fn new(registry: Arc<StepHandlerRegistry>, config: PipelineConfig) -> Self {
        let runner = PipelineRunner::from_config(StepExecutor::new(registry.clone()), &config.execution);
        Self {
            registry,
            runner,
            config,
        }
    }

    /// Orchestrator with every built-in step type backed by `queue`
    ///
    /// The returned orchestrator's registry can still take custom handlers.
    pub fn with_job_queue(queue: Arc<dyn JobQueue>, config: PipelineConfig) -> Self {
        let registry = Arc::new(StepHandlerRegistry::new());
        register_builtin_handlers(&registry, queue, &config);
        Self::new(registry, config)
    }

    pub fn registry(&self) -> &Arc<StepHandlerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn runner(&self) -> &PipelineRunner {
        &self.runner
    }

    pub fn validate_workflow(&self, definition: &WorkflowDefinition) -> ValidationReport {
        definition.validate()
    }

    /// Validate and run `definition` with an empty global context
    pub async fn execute_workflow(
        &self,
        definition: &WorkflowDefinition,
        input: serde_json::Value,
    ) -> OrchestrationResult<WorkflowExecution> {
        self.execute_workflow_with_context(definition, input, HashMap::new())
            .await
    }

    /// Validate and run `definition`, seeding the run's global context
    #[instrument(skip_all, fields(workflow_id = %definition.id))]
    pub async fn execute_workflow_with_context(
        &self,
        definition: &WorkflowDefinition,
        input: serde_json::Value,
        initial_context: HashMap<String, serde_json::Value>,
    ) -> OrchestrationResult<WorkflowExecution> {
        let report = definition.validate();
        if !report.valid {
            let details = report.errors.join("; ");
            log_error(
                "WorkflowOrchestrator",
                "execute_workflow",
                &details,
                Some(&definition.id),
            );
            return Err(OrchestrationError::invalid_workflow(
                definition.id.clone(),
                report.errors,
            ));
        }

        let execution_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        log_workflow_operation(
            "execute_workflow",
            &definition.id,
            Some(&execution_id),
            "started",
            None,
        );

        let global_context = Arc::new(GlobalContext::from_map(initial_context));
        let base_context = StepExecutionContext::new(
            definition.id.clone(),
            execution_id.clone(),
            input,
            global_context.clone(),
        );

        let results = self
            .runner
            .execute_steps_in_order(&definition.steps, &base_context)
            .await;

        let status = WorkflowStatus::from_results(&results, definition.steps.len());
        let execution = WorkflowExecution {
            execution_id,
            workflow_id: definition.id.clone(),
            status,
            results,
            started_at,
            completed_at: Utc::now(),
            global_context: global_context.snapshot(),
        };

        let status_label = match execution.status {
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::PartiallyCompleted => "partially_completed",
        };
        let failed = execution.failed_steps().join(", ");
        log_workflow_operation(
            "execute_workflow",
            &execution.workflow_id,
            Some(&execution.execution_id),
            status_label,
            (!failed.is_empty()).then_some(failed.as_str()),
        );

        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::{StepExecutionResult, StepType};
    use serde_json::json;

    const PROPOSAL_YAML: &str = r#"
id: proposal
name: Proposal generation
steps:
  - id: analyze
    type: document-analysis
    config:
      model: fast
  - id: estimate
    type: estimation
    dependencies: [analyze]
environments:
  production:
    steps:
      - id: analyze
        config:
          model: accurate
          priority: 10
"#;

    fn echo_registry() -> Arc<StepHandlerRegistry> {
        let registry = Arc::new(StepHandlerRegistry::new());
        for step_type in StepType::builtin() {
            registry.register(step_type, |context: StepExecutionContext, step: Step| async move {
                context.global_context.update("visited", |current| {
                    json!(current.and_then(|v| v.as_u64()).unwrap_or(0) + 1)
                });
                Ok::<_, anyhow::Error>(StepExecutionResult::success(json!(step.id)))
            });
        }
        registry
    }

    #[test]
    fn test_from_yaml_parses_steps() {
        let definition = WorkflowDefinition::from_yaml(PROPOSAL_YAML, "development").unwrap();
        assert_eq!(definition.id, "proposal");
        assert_eq!(definition.name.as_deref(), Some("Proposal generation"));
        assert_eq!(definition.steps.len(), 2);
        assert_eq!(definition.steps[1].step_type, StepType::Estimation);
        assert_eq!(definition.steps[1].dependencies, vec!["analyze"]);
        assert_eq!(definition.steps[0].config, json!({"model": "fast"}));
    }

    #[test]
    fn test_environment_overrides_merge_config() {
        let definition = WorkflowDefinition::from_yaml(PROPOSAL_YAML, "production").unwrap();
        assert_eq!(
            definition.steps[0].config,
            json!({"model": "accurate", "priority": 10})
        );
    }

    #[test]
    fn test_env_var_interpolation() {
        std::env::set_var("TASKER_PIPELINE_TEST_MODEL", "interpolated-model");
        let yaml = "id: wf\nsteps:\n  - id: a\n    type: estimation\n    config:\n      model: ${TASKER_PIPELINE_TEST_MODEL}\n      other: ${TASKER_PIPELINE_TEST_UNSET_VAR}\n";
        let definition = WorkflowDefinition::from_yaml(yaml, "test").unwrap();

        assert_eq!(definition.steps[0].config["model"], json!("interpolated-model"));
        assert_eq!(
            definition.steps[0].config["other"],
            json!("${TASKER_PIPELINE_TEST_UNSET_VAR}")
        );
    }

    #[test]
    fn test_interpolated_value_cannot_change_yaml_structure() {
        std::env::set_var(
            "TASKER_PIPELINE_TEST_STRUCTURED",
            "gpt: fast\n    injected: true",
        );
        let yaml = "id: wf\nsteps:\n  - id: a\n    type: estimation\n    config:\n      model: ${TASKER_PIPELINE_TEST_STRUCTURED}\n      label: \"model is ${TASKER_PIPELINE_TEST_STRUCTURED}\"\n";
        let definition = WorkflowDefinition::from_yaml(yaml, "test").unwrap();

        let config = &definition.steps[0].config;
        assert_eq!(config["model"], json!("gpt: fast\n    injected: true"));
        assert_eq!(config["label"], json!("model is gpt: fast\n    injected: true"));
        assert!(config.get("injected").is_none());
        assert_eq!(config.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_interpolation_reuses_compiled_pattern() {
        assert!(std::ptr::eq(interpolation_pattern(), interpolation_pattern()));
        assert_eq!(interpolate_str("no variables here"), "no variables here");
    }

    #[test]
    fn test_invalid_yaml_is_a_load_error() {
        let result = WorkflowDefinition::from_yaml("id: [unclosed", "test");
        assert!(matches!(
            result,
            Err(OrchestrationError::WorkflowLoadFailed { .. })
        ));
    }

    #[test]
    fn test_validate_reports_blank_ids() {
        let definition = WorkflowDefinition::new(" ", vec![Step::new("", StepType::Estimation)]);
        let report = definition.validate();
        assert!(!report.valid);
        assert!(report.errors.contains(&"Workflow id cannot be empty".to_string()));
        assert!(report.errors.contains(&"Step at position 0 has an empty id".to_string()));
    }

    #[tokio::test]
    async fn test_execute_workflow_completes() {
        let orchestrator = WorkflowOrchestrator::new(echo_registry(), PipelineConfig::default());
        let definition = WorkflowDefinition::from_yaml(PROPOSAL_YAML, "development").unwrap();

        let execution = orchestrator
            .execute_workflow(&definition, json!({"document": "rfp.pdf"}))
            .await
            .unwrap();

        assert_eq!(execution.status, WorkflowStatus::Completed);
        assert!(execution.is_success());
        assert_eq!(execution.results.len(), 2);
        assert_eq!(execution.global_context["visited"], json!(2));
        assert!(Uuid::parse_str(&execution.execution_id).is_ok());
        assert!(execution.completed_at >= execution.started_at);
    }

    #[tokio::test]
    async fn test_each_run_gets_fresh_execution_and_context() {
        let orchestrator = WorkflowOrchestrator::new(echo_registry(), PipelineConfig::default());
        let definition = WorkflowDefinition::from_yaml(PROPOSAL_YAML, "development").unwrap();

        let first = orchestrator.execute_workflow(&definition, json!({})).await.unwrap();
        let second = orchestrator.execute_workflow(&definition, json!({})).await.unwrap();

        assert_ne!(first.execution_id, second.execution_id);
        assert_eq!(second.global_context["visited"], json!(2));
    }

    #[tokio::test]
    async fn test_invalid_workflow_is_rejected_before_running() {
        let orchestrator = WorkflowOrchestrator::new(echo_registry(), PipelineConfig::default());
        let definition = WorkflowDefinition::new(
            "broken",
            vec![Step::new("x", StepType::Estimation).with_dependencies(["y"])],
        );

        let error = orchestrator
            .execute_workflow(&definition, json!({}))
            .await
            .unwrap_err();
        match error {
            OrchestrationError::InvalidWorkflow { workflow_id, errors } => {
                assert_eq!(workflow_id, "broken");
                assert_eq!(errors, vec!["Step x depends on non-existent step y"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_partial_and_failed_status() {
        let registry = echo_registry();
        let orchestrator = WorkflowOrchestrator::new(registry, PipelineConfig::default());

        let partial = WorkflowDefinition::new(
            "partial",
            vec![
                Step::new("ok", StepType::Estimation),
                Step::new("missing", StepType::Custom("unregistered-type".into())),
            ],
        );
        let execution = orchestrator.execute_workflow(&partial, json!({})).await.unwrap();
        assert_eq!(execution.status, WorkflowStatus::PartiallyCompleted);
        assert_eq!(execution.failed_steps(), vec!["missing"]);

        let failed = WorkflowDefinition::new(
            "failed",
            vec![Step::new("missing", StepType::Custom("unregistered-type".into()))],
        );
        let execution = orchestrator.execute_workflow(&failed, json!({})).await.unwrap();
        assert_eq!(execution.status, WorkflowStatus::Failed);
    }
}
