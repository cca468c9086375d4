//! # Dependency Graph
//!
//! Validates a step set before anything runs and derives a topological
//! execution order from it.
//!
//! Steps are stored in an index arena in declaration order; edges point from a
//! step to the steps it depends on. Dependencies naming unknown ids are kept
//! aside as dangling references and never become edges.

use crate::orchestration::types::Step;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Outcome of validating a step set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate `steps` for duplicate ids, dangling dependencies and cycles
///
/// Only the first cycle found is reported.
pub fn validate(steps: &[Step]) -> ValidationReport {
    DependencyGraph::new(steps).validate()
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// `edges[i]` holds the arena indices step `i` depends on
    edges: Vec<Vec<usize>>,
    dangling: Vec<(String, String)>,
    duplicates: Vec<String>,
}

impl DependencyGraph {
    pub fn new(steps: &[Step]) -> Self {
        let mut ids = Vec::with_capacity(steps.len());
        let mut index = HashMap::with_capacity(steps.len());
        let mut duplicates = Vec::new();
        let mut arena_steps = Vec::with_capacity(steps.len());

        for step in steps {
            if index.contains_key(&step.id) {
                duplicates.push(step.id.clone());
                continue;
            }
            index.insert(step.id.clone(), ids.len());
            ids.push(step.id.clone());
            arena_steps.push(step);
        }

        let mut edges = Vec::with_capacity(ids.len());
        let mut dangling = Vec::new();
        for step in arena_steps {
            let mut targets = Vec::with_capacity(step.dependencies.len());
            for dependency in &step.dependencies {
                match index.get(dependency) {
                    Some(&target) => targets.push(target),
                    None => dangling.push((step.id.clone(), dependency.clone())),
                }
            }
            edges.push(targets);
        }

        Self {
            ids,
            index,
            edges,
            dangling,
            duplicates,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.index.contains_key(step_id)
    }

    /// `(step, missing dependency)` pairs
    pub fn dangling_references(&self) -> &[(String, String)] {
        &self.dangling
    }

    pub fn validate(&self) -> ValidationReport {
        let mut errors: Vec<String> = self
            .duplicates
            .iter()
            .map(|id| format!("Duplicate step id {id}"))
            .collect();

        errors.extend(
            self.dangling
                .iter()
                .map(|(step, missing)| format!("Step {step} depends on non-existent step {missing}")),
        );

        if let Some(cycle) = self.find_cycle() {
            errors.push(format!("Circular dependency detected: {}", cycle.join(" -> ")));
        }

        debug!(
            steps = self.ids.len(),
            errors = errors.len(),
            "Validated dependency graph"
        );
        ValidationReport::from_errors(errors)
    }

    /// First cycle found, as a closed path (`a -> b -> a`) of step ids
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let node_count = self.ids.len();
        let mut visited = vec![false; node_count];
        let mut on_stack = vec![false; node_count];

        for start in 0..node_count {
            if visited[start] {
                continue;
            }

            // (node, next edge to explore)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            visited[start] = true;
            on_stack[start] = true;

            while let Some(frame) = stack.last_mut() {
                let (node, next_edge) = *frame;

                if let Some(&target) = self.edges[node].get(next_edge) {
                    frame.1 += 1;

                    if on_stack[target] {
                        let cycle_start = stack
                            .iter()
                            .position(|(n, _)| *n == target)
                            .unwrap_or(0);
                        let mut cycle: Vec<String> = stack[cycle_start..]
                            .iter()
                            .map(|(n, _)| self.ids[*n].clone())
                            .collect();
                        cycle.push(self.ids[target].clone());
                        return Some(cycle);
                    }

                    if !visited[target] {
                        visited[target] = true;
                        on_stack[target] = true;
                        stack.push((target, 0));
                    }
                } else {
                    on_stack[node] = false;
                    stack.pop();
                }
            }
        }

        None
    }

    /// Dependencies-first order, ties broken by declaration order
    ///
    /// Returns `None` when the graph has a cycle.
    pub fn execution_order(&self) -> Option<Vec<String>> {
        self.execution_levels()
            .map(|levels| levels.into_iter().flatten().collect())
    }

    /// Steps grouped into waves whose members only depend on earlier waves
    ///
    /// Returns `None` when the graph has a cycle.
    pub fn execution_levels(&self) -> Option<Vec<Vec<String>>> {
        let node_count = self.ids.len();
        let mut remaining: Vec<usize> = self
            .edges
            .iter()
            .map(|targets| {
                targets
                    .iter()
                    .copied()
                    .collect::<BTreeSet<usize>>()
                    .len()
            })
            .collect();

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for (node, targets) in self.edges.iter().enumerate() {
            let unique: BTreeSet<usize> = targets.iter().copied().collect();
            for target in unique {
                dependents[target].push(node);
            }
        }

        let mut ready: BTreeSet<usize> = (0..node_count).filter(|&n| remaining[n] == 0).collect();
        let mut levels = Vec::new();
        let mut emitted = 0;

        while !ready.is_empty() {
            let wave: Vec<usize> = std::mem::take(&mut ready).into_iter().collect();
            emitted += wave.len();

            for &node in &wave {
                for &dependent in &dependents[node] {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        ready.insert(dependent);
                    }
                }
            }

            levels.push(wave.into_iter().map(|n| self.ids[n].clone()).collect());
        }

        (emitted == node_count).then_some(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::StepType;

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, StepType::Custom("stub".into())).with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_valid_linear_chain() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])];
        let report = validate(&steps);

        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert_eq!(
            DependencyGraph::new(&steps).execution_order().unwrap(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_dangling_dependency_names_both_steps() {
        let report = validate(&[step("x", &["y"])]);
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Step x depends on non-existent step y"]);
    }

    #[test]
    fn test_cycle_reports_closed_path() {
        let steps = vec![step("a", &["c"]), step("b", &["a"]), step("c", &["b"])];
        let report = validate(&steps);

        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0], "Circular dependency detected: a -> c -> b -> a");
        assert!(DependencyGraph::new(&steps).execution_order().is_none());
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let cycle = DependencyGraph::new(&[step("solo", &["solo"])]).find_cycle();
        assert_eq!(cycle, Some(vec!["solo".to_string(), "solo".to_string()]));
    }

    #[test]
    fn test_only_first_cycle_reported() {
        let steps = vec![
            step("a", &["b"]),
            step("b", &["a"]),
            step("c", &["d"]),
            step("d", &["c"]),
        ];
        let report = validate(&steps);
        let cycle_errors: Vec<_> = report
            .errors
            .iter()
            .filter(|e| e.starts_with("Circular dependency"))
            .collect();
        assert_eq!(cycle_errors.len(), 1);
        assert!(cycle_errors[0].contains("a -> b -> a"));
    }

    #[test]
    fn test_duplicate_ids_reported() {
        let report = validate(&[step("a", &[]), step("a", &[])]);
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Duplicate step id a"]);
    }

    #[test]
    fn test_dangling_and_cycle_both_reported() {
        let steps = vec![step("a", &["b", "ghost"]), step("b", &["a"])];
        let report = validate(&steps);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0], "Step a depends on non-existent step ghost");
        assert!(report.errors[1].starts_with("Circular dependency detected"));
    }

    #[test]
    fn test_diamond_levels() {
        let steps = vec![
            step("fetch", &[]),
            step("left", &["fetch"]),
            step("right", &["fetch"]),
            step("join", &["left", "right", "left"]),
        ];
        let levels = DependencyGraph::new(&steps).execution_levels().unwrap();
        assert_eq!(
            levels,
            vec![
                vec!["fetch".to_string()],
                vec!["left".to_string(), "right".to_string()],
                vec!["join".to_string()],
            ]
        );
    }

    #[test]
    fn test_empty_graph_is_valid() {
        let graph = DependencyGraph::new(&[]);
        assert!(graph.is_empty());
        assert!(graph.validate().valid);
        assert_eq!(graph.execution_order(), Some(vec![]));
    }
}
