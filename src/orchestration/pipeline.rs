//! # Pipeline Runner
//!
//! Executes a step set so that every step runs after all of its declared
//! dependencies, and each step id runs exactly once.
//!
//! ## Scheduling
//!
//! - **Sequential** (default, `max_concurrent_steps == 1`): an iterative
//!   depth-first walk over the step list. `executed` and `executing` sets
//!   memoize progress and guard against re-entry on cyclic input.
//! - **Concurrent** (`max_concurrent_steps > 1`): a ready set of steps whose
//!   dependencies all have terminal results, drained through
//!   `FuturesUnordered` up to the concurrency limit.
//!
//! Each step sees only its own dependencies in `previous_results`. A
//! dependency id that is not part of the step set is left for the executor's
//! dependency guard to report. What happens to dependents of a failed step is
//! governed by [`DependencyFailurePolicy`].

use crate::config::ExecutionConfig;
use crate::constants::{self, metadata};
use crate::orchestration::context::StepExecutionContext;
use crate::orchestration::step_executor::StepExecutor;
use crate::orchestration::types::{
    DependencyFailurePolicy, ExecutionResults, Step, StepExecutionResult,
};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct PipelineRunner {
    executor: StepExecutor,
    policy: DependencyFailurePolicy,
    max_concurrent_steps: usize,
}

impl PipelineRunner {
    pub fn new(executor: StepExecutor) -> Self {
        Self {
            executor,
            policy: DependencyFailurePolicy::default(),
            max_concurrent_steps: constants::DEFAULT_MAX_CONCURRENT_STEPS,
        }
    }

    pub fn from_config(executor: StepExecutor, config: &ExecutionConfig) -> Self {
        Self::new(executor)
            .with_policy(config.on_dependency_failure)
            .with_max_concurrent_steps(config.max_concurrent_steps)
    }

    pub fn with_policy(mut self, policy: DependencyFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_concurrent_steps(mut self, max_concurrent_steps: usize) -> Self {
        self.max_concurrent_steps = max_concurrent_steps.max(1);
        self
    }

    pub fn executor(&self) -> &StepExecutor {
        &self.executor
    }

    pub fn policy(&self) -> DependencyFailurePolicy {
        self.policy
    }

    /// Run `steps` in dependency order and collect one result per executed step
    ///
    /// `base_context` supplies the workflow and execution ids, the input and
    /// the run's global context; a per-step context is derived from it.
    #[instrument(skip_all, fields(execution_id = %base_context.execution_id, steps = steps.len()))]
    pub async fn execute_steps_in_order(
        &self,
        steps: &[Step],
        base_context: &StepExecutionContext,
    ) -> ExecutionResults {
        info!(
            policy = ?self.policy,
            max_concurrent_steps = self.max_concurrent_steps,
            "Starting pipeline run"
        );

        let results = if self.max_concurrent_steps > 1 {
            self.run_concurrent(steps, base_context).await
        } else {
            self.run_sequential(steps, base_context).await
        };

        let failed = results.values().filter(|result| !result.success).count();
        info!(executed = results.len(), failed, "Pipeline run finished");
        results
    }

    async fn run_sequential(
        &self,
        steps: &[Step],
        base_context: &StepExecutionContext,
    ) -> ExecutionResults {
        let index = index_steps(steps);
        let mut executed: HashSet<&str> = HashSet::with_capacity(index.len());
        let mut executing: HashSet<&str> = HashSet::new();
        let mut results = ExecutionResults::with_capacity(index.len());
        let mut aborted = false;

        for root in steps {
            if aborted {
                break;
            }
            if executed.contains(root.id.as_str()) {
                continue;
            }

            // (step, next dependency to visit)
            let mut stack: Vec<(&Step, usize)> = vec![(root, 0)];
            executing.insert(root.id.as_str());

            while let Some(frame) = stack.last_mut() {
                let (step, next_dependency) = *frame;

                if let Some(dependency) = step.dependencies.get(next_dependency) {
                    frame.1 += 1;
                    let dependency = dependency.as_str();
                    if executed.contains(dependency) {
                        continue;
                    }
                    if executing.contains(dependency) {
                        warn!(
                            step_id = %step.id,
                            dependency = %dependency,
                            "Dependency re-entered while executing, leaving it to the dependency guard"
                        );
                        continue;
                    }
                    if let Some(&dependency_step) = index.get(dependency) {
                        executing.insert(dependency);
                        stack.push((dependency_step, 0));
                    }
                    continue;
                }

                stack.pop();
                executing.remove(step.id.as_str());
                executed.insert(step.id.as_str());

                if aborted {
                    continue;
                }

                let result = self.run_step(step, base_context, &results).await;
                if !result.success && self.policy == DependencyFailurePolicy::Abort {
                    warn!(step_id = %step.id, "Step failed, aborting remaining steps");
                    aborted = true;
                }
                results.insert(step.id.clone(), result);
            }
        }

        results
    }

    async fn run_concurrent(
        &self,
        steps: &[Step],
        base_context: &StepExecutionContext,
    ) -> ExecutionResults {
        // Unique steps in declaration order
        let mut nodes: Vec<&Step> = Vec::with_capacity(steps.len());
        let mut position: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
        for step in steps {
            if !position.contains_key(step.id.as_str()) {
                position.insert(step.id.as_str(), nodes.len());
                nodes.push(step);
            }
        }

        let mut remaining: Vec<usize> = vec![0; nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (node, step) in nodes.iter().enumerate() {
            let known: BTreeSet<usize> = step
                .dependencies
                .iter()
                .filter_map(|dependency| position.get(dependency.as_str()).copied())
                .collect();
            remaining[node] = known.len();
            for dependency in known {
                dependents[dependency].push(node);
            }
        }

        let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&n| remaining[n] == 0).collect();
        let mut started = vec![false; nodes.len()];
        let mut finished = 0usize;
        let mut results = ExecutionResults::with_capacity(nodes.len());
        let mut in_flight = FuturesUnordered::new();
        let mut aborted = false;

        loop {
            while !aborted && in_flight.len() < self.max_concurrent_steps {
                let Some(node) = ready.pop_first() else {
                    break;
                };
                if started[node] {
                    continue;
                }
                started[node] = true;
                let step = nodes[node];

                if let Some(skipped) = self.skip_result(step, &results) {
                    results.insert(step.id.clone(), skipped);
                    finished += 1;
                    release_dependents(node, &dependents, &mut remaining, &mut ready);
                    continue;
                }

                let context = base_context.for_step(step.id.clone(), scoped_results(step, &results));
                let executor = &self.executor;
                debug!(step_id = %step.id, in_flight = in_flight.len(), "Starting step");
                in_flight.push(async move {
                    let result = executor.execute_step(step, &context).await;
                    (node, result)
                });
            }

            if in_flight.is_empty() {
                if aborted || finished == nodes.len() {
                    break;
                }
                // Only cyclic leftovers remain: force the earliest one so the
                // dependency guard reports it
                match (0..nodes.len()).find(|&n| !started[n]) {
                    Some(node) => {
                        warn!(
                            step_id = %nodes[node].id,
                            "No runnable steps left, forcing step with unresolved dependencies"
                        );
                        ready.insert(node);
                        continue;
                    }
                    None => break,
                }
            }

            if let Some((node, result)) = in_flight.next().await {
                finished += 1;
                if !result.success && self.policy == DependencyFailurePolicy::Abort && !aborted {
                    warn!(step_id = %nodes[node].id, "Step failed, aborting remaining steps");
                    aborted = true;
                }
                results.insert(nodes[node].id.clone(), result);
                release_dependents(node, &dependents, &mut remaining, &mut ready);
            }
        }

        results
    }

    /// Execute `step`, or produce its skipped result under [`DependencyFailurePolicy::Skip`]
    async fn run_step(
        &self,
        step: &Step,
        base_context: &StepExecutionContext,
        results: &ExecutionResults,
    ) -> StepExecutionResult {
        if let Some(skipped) = self.skip_result(step, results) {
            return skipped;
        }

        let context = base_context.for_step(step.id.clone(), scoped_results(step, results));
        self.executor.execute_step(step, &context).await
    }

    fn skip_result(&self, step: &Step, results: &ExecutionResults) -> Option<StepExecutionResult> {
        if self.policy != DependencyFailurePolicy::Skip {
            return None;
        }

        let failed_dependency = step
            .dependencies
            .iter()
            .find(|dependency| results.get(*dependency).is_some_and(|result| !result.success))?;

        debug!(
            step_id = %step.id,
            dependency = %failed_dependency,
            "Skipping step after dependency failure"
        );
        Some(
            StepExecutionResult::failure(format!("Skipped: dependency {failed_dependency} failed"))
                .with_metadata(metadata::SKIPPED, json!(true))
                .with_metadata(metadata::FAILED_DEPENDENCY, json!(failed_dependency)),
        )
    }
}

fn index_steps(steps: &[Step]) -> HashMap<&str, &Step> {
    let mut index = HashMap::with_capacity(steps.len());
    for step in steps {
        index.entry(step.id.as_str()).or_insert(step);
    }
    index
}

/// Results of `step`'s declared dependencies only
fn scoped_results(step: &Step, results: &ExecutionResults) -> HashMap<String, StepExecutionResult> {
    step.dependencies
        .iter()
        .filter_map(|dependency| {
            results
                .get(dependency)
                .map(|result| (dependency.clone(), result.clone()))
        })
        .collect()
}

fn release_dependents(
    node: usize,
    dependents: &[Vec<usize>],
    remaining: &mut [usize],
    ready: &mut BTreeSet<usize>,
) {
    for &dependent in &dependents[node] {
        remaining[dependent] = remaining[dependent].saturating_sub(1);
        if remaining[dependent] == 0 {
            ready.insert(dependent);
        }
    }
}
