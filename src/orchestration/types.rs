//! # Orchestration Types
//!
//! Core types shared by the graph validator, the executor and the pipeline
//! runner: steps, step types, step results and the dependency failure policy.

use crate::orchestration::errors::OrchestrationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of work a step performs, used to resolve its handler
///
/// The built-in kinds serialize as their kebab-case tag. Any other tag parses
/// as [`StepType::Custom`] so plugin step kinds can be registered without
/// changing this enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepType {
    DocumentAnalysis,
    RequirementExtraction,
    Estimation,
    CommunicationGeneration,
    CodebaseAnalysis,
    FileOperation,
    Notification,
    Custom(String),
}

impl StepType {
    /// All built-in step types, in declaration order
    pub fn builtin() -> [StepType; 7] {
        [
            StepType::DocumentAnalysis,
            StepType::RequirementExtraction,
            StepType::Estimation,
            StepType::CommunicationGeneration,
            StepType::CodebaseAnalysis,
            StepType::FileOperation,
            StepType::Notification,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepType::DocumentAnalysis => "document-analysis",
            StepType::RequirementExtraction => "requirement-extraction",
            StepType::Estimation => "estimation",
            StepType::CommunicationGeneration => "communication-generation",
            StepType::CodebaseAnalysis => "codebase-analysis",
            StepType::FileOperation => "file-operation",
            StepType::Notification => "notification",
            StepType::Custom(tag) => tag,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, StepType::Custom(_))
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        if tag.is_empty() {
            return Err(OrchestrationError::ConfigurationError(
                "Step type cannot be empty".to_string(),
            ));
        }

        let step_type = StepType::builtin()
            .into_iter()
            .find(|builtin| builtin.as_str() == tag)
            .unwrap_or_else(|| StepType::Custom(tag.to_string()));
        Ok(step_type)
    }
}

impl Serialize for StepType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

/// A unit of work in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within a workflow
    pub id: String,

    #[serde(rename = "type", alias = "step_type")]
    pub step_type: StepType,

    /// Ids of steps that must reach a terminal result first, in declared order
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Opaque per-step configuration handed to the handler
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
}

fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Step {
    pub fn new(id: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: id.into(),
            step_type,
            dependencies: Vec::new(),
            config: empty_config(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// What the pipeline runner does with dependents of a failed step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyFailurePolicy {
    /// Run dependents anyway; the failed result is visible in `previous_results`
    #[default]
    Proceed,
    /// Do not invoke dependents; record a skipped failure for each, transitively
    Skip,
    /// Start no further steps after the first failure
    Abort,
}

/// Normalized outcome of one step invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(rename = "duration_ms", with = "crate::utils::serde::duration_ms")]
    pub duration: Duration,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StepExecutionResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            duration: Duration::ZERO,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            duration: Duration::ZERO,
            metadata: HashMap::new(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the result was produced without invoking the step's handler
    pub fn is_skipped(&self) -> bool {
        self.metadata
            .get(crate::constants::metadata::SKIPPED)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// Results of one run, keyed by step id
pub type ExecutionResults = HashMap<String, StepExecutionResult>;
