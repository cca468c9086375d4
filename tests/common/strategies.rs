use proptest::prelude::*;
use proptest::strategy::Just;
use tasker_pipeline::orchestration::Step;

use super::test_step;

/// Strategy for generating step ids
pub fn step_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

/// Strategy for generating small custom DAG edge lists over nodes 0..6
pub fn acyclic_dag_strategy() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..6, 0usize..6), 0..12).prop_map(|edges| {
        // Orient every edge from lower to higher index; drop self-loops
        edges
            .into_iter()
            .filter(|(from, to)| from != to)
            .map(|(from, to)| (from.min(to), from.max(to)))
            .collect()
    })
}

/// Realistic workflow shapes
#[derive(Debug, Clone)]
pub enum WorkflowPattern {
    Linear(usize),
    Diamond,
    FanOut(usize),
    FanIn(usize),
    Complex(Vec<(usize, usize)>),
}

pub fn workflow_pattern_strategy() -> impl Strategy<Value = WorkflowPattern> {
    prop_oneof![
        (2usize..=10).prop_map(WorkflowPattern::Linear),
        Just(WorkflowPattern::Diamond),
        (2usize..=8).prop_map(WorkflowPattern::FanOut),
        (2usize..=8).prop_map(WorkflowPattern::FanIn),
        acyclic_dag_strategy().prop_map(WorkflowPattern::Complex),
    ]
}

impl WorkflowPattern {
    pub fn step_count(&self) -> usize {
        match self {
            WorkflowPattern::Linear(n) => *n,
            WorkflowPattern::Diamond => 4,
            WorkflowPattern::FanOut(n) | WorkflowPattern::FanIn(n) => n + 1,
            WorkflowPattern::Complex(edges) => edges
                .iter()
                .flat_map(|(from, to)| [*from, *to])
                .max()
                .map(|max| max + 1)
                .unwrap_or(1),
        }
    }

    /// Edges as (upstream, downstream) node indices
    pub fn edges(&self) -> Vec<(usize, usize)> {
        match self {
            WorkflowPattern::Linear(n) => (0..(*n - 1)).map(|i| (i, i + 1)).collect(),
            WorkflowPattern::Diamond => vec![(0, 1), (0, 2), (1, 3), (2, 3)],
            WorkflowPattern::FanOut(n) => (1..=*n).map(|i| (0, i)).collect(),
            WorkflowPattern::FanIn(n) => (0..*n).map(|i| (i, *n)).collect(),
            WorkflowPattern::Complex(edges) => edges.clone(),
        }
    }

    /// Steps named `s0..sN`, listed in reverse so declaration order never
    /// matches dependency order
    pub fn steps(&self) -> Vec<Step> {
        let edges = self.edges();
        (0..self.step_count())
            .rev()
            .map(|node| {
                let id = format!("s{node}");
                let dependencies: Vec<String> = edges
                    .iter()
                    .filter(|(_, to)| *to == node)
                    .map(|(from, _)| format!("s{from}"))
                    .collect();
                let dependencies: Vec<&str> = dependencies.iter().map(String::as_str).collect();
                test_step(&id, &dependencies)
            })
            .collect()
    }

    /// A back edge from the last node in a downstream chain to its root,
    /// if the pattern has one
    pub fn back_edge(&self) -> Option<(usize, usize)> {
        self.edges().first().map(|&(from, to)| (to, from))
    }
}
