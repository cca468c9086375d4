//! # Execution Context
//!
//! [`StepExecutionContext`] is the per-invocation bundle handed to a step
//! handler. [`GlobalContext`] is the mutable key-value scratch space shared by
//! every step of one run, and only that run.

use crate::orchestration::types::StepExecutionResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-run shared key-value context
///
/// Owned by a single workflow execution and passed to each of its steps by
/// `Arc`. Interior locking keeps individual operations atomic; callers that
/// need read-modify-write should use [`GlobalContext::update`].
#[derive(Debug, Default)]
pub struct GlobalContext {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl GlobalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: HashMap<String, serde_json::Value>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.read().get(key).cloned()
    }

    /// Store a value, returning the previous one
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) -> Option<serde_json::Value> {
        self.values.write().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.values.write().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Apply `f` to the current value under the write lock and store the result
    pub fn update<F>(&self, key: &str, f: F) -> serde_json::Value
    where
        F: FnOnce(Option<&serde_json::Value>) -> serde_json::Value,
    {
        let mut values = self.values.write();
        let next = f(values.get(key));
        values.insert(key.to_string(), next.clone());
        next
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Copy of every entry at this point in time
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.values.read().clone()
    }
}

/// Everything a handler receives for one step invocation
#[derive(Debug, Clone)]
pub struct StepExecutionContext {
    pub workflow_id: String,
    pub execution_id: String,
    pub step_id: String,
    /// Workflow-level input payload
    pub input: serde_json::Value,
    /// Results of this step's declared dependencies only
    pub previous_results: HashMap<String, StepExecutionResult>,
    pub global_context: Arc<GlobalContext>,
}

impl StepExecutionContext {
    /// Run-level context with no step bound yet
    pub fn new(
        workflow_id: impl Into<String>,
        execution_id: impl Into<String>,
        input: serde_json::Value,
        global_context: Arc<GlobalContext>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: execution_id.into(),
            step_id: String::new(),
            input,
            previous_results: HashMap::new(),
            global_context,
        }
    }

    /// Derive the context for one step, sharing this run's global context
    pub fn for_step(
        &self,
        step_id: impl Into<String>,
        previous_results: HashMap<String, StepExecutionResult>,
    ) -> Self {
        Self {
            workflow_id: self.workflow_id.clone(),
            execution_id: self.execution_id.clone(),
            step_id: step_id.into(),
            input: self.input.clone(),
            previous_results,
            global_context: Arc::clone(&self.global_context),
        }
    }

    /// Output of a completed dependency, if it succeeded with one
    pub fn dependency_output(&self, step_id: &str) -> Option<&serde_json::Value> {
        self.previous_results
            .get(step_id)
            .filter(|result| result.success)
            .and_then(|result| result.output.as_ref())
    }
}
